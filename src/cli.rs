use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use invoice_audit::{BatchOptions, Config, RuleConfiguration};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "invoice-audit",
    version,
    about = "Batch compliance audit for PDF invoices"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to an audit.toml configuration file")]
    pub config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Audit PDF files (directories are scanned for *.pdf)
    Audit {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        rules: RuleArgs,
        #[arg(long, help = "Documents extracted in parallel (1 = sequential)")]
        jobs: Option<usize>,
        #[arg(long, help = "Per-document extraction timeout in seconds")]
        timeout_secs: Option<u64>,
        #[arg(long, value_name = "FILE", help = "Write the audit log as CSV")]
        csv: Option<PathBuf>,
        #[arg(long, help = "Print the report as JSON instead of a table")]
        json: bool,
    },
    /// Show extracted text, detected amounts and the resolved total for one file
    Inspect {
        file: PathBuf,
        #[command(flatten)]
        rules: RuleArgs,
        #[arg(long, default_value_t = 2000)]
        preview_chars: usize,
    },
    /// Validate the configuration and print the effective rules
    CheckConfig {
        #[command(flatten)]
        rules: RuleArgs,
    },
}

#[derive(Args, Debug, Default)]
pub struct RuleArgs {
    #[arg(long, help = "Transactions above this amount are flagged")]
    pub threshold: Option<f64>,
    #[arg(
        long = "vendor",
        value_name = "NAME",
        help = "Watchlist vendor (repeatable); replaces the configured watchlist"
    )]
    pub vendors: Vec<String>,
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with = "vendors",
        help = "Watchlist file, one vendor per line"
    )]
    pub watchlist_file: Option<PathBuf>,
}

impl RuleArgs {
    /// Command-line values win over the configuration file.
    pub fn resolve(&self, config: &Config) -> Result<RuleConfiguration> {
        let threshold = self.threshold.unwrap_or(config.rules.threshold);

        let rules = if let Some(path) = &self.watchlist_file {
            let lines = fs::read_to_string(path)
                .with_context(|| format!("reading watchlist {}", path.display()))?;
            RuleConfiguration::new(threshold, &lines)?
        } else if !self.vendors.is_empty() {
            RuleConfiguration::from_vendors(threshold, &self.vendors)?
        } else {
            RuleConfiguration::new(threshold, &config.rules.watchlist)?
        };
        Ok(rules)
    }
}

pub fn batch_options(
    config: &Config,
    jobs: Option<usize>,
    timeout_secs: Option<u64>,
) -> Result<BatchOptions> {
    let defaults = config.batch_options()?;
    let options = BatchOptions::new(
        jobs.unwrap_or(defaults.jobs()),
        timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.document_timeout()),
    )?;
    Ok(options)
}
