use crate::error::ConfigurationError;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

pub const DEFAULT_THRESHOLD: f64 = 500.0;
pub const DEFAULT_WATCHLIST: &str = "Bad Wolf Corp\nBolton\nSuspicious LLC";
const DEFAULT_JOBS: usize = 1;
const DEFAULT_DOCUMENT_TIMEOUT_SECS: u64 = 60;

/// On-disk configuration (`audit.toml`). Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rules: RulesSection,
    #[serde(default)]
    pub batch: BatchSection,
}

#[derive(Debug, Deserialize)]
pub struct RulesSection {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Raw watchlist text, one vendor per line.
    #[serde(default = "default_watchlist")]
    pub watchlist: String,
}

impl Default for RulesSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            watchlist: default_watchlist(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_document_timeout_secs")]
    pub document_timeout_secs: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            document_timeout_secs: default_document_timeout_secs(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_watchlist() -> String {
    DEFAULT_WATCHLIST.to_string()
}

fn default_jobs() -> usize {
    DEFAULT_JOBS
}

fn default_document_timeout_secs() -> u64 {
    DEFAULT_DOCUMENT_TIMEOUT_SECS
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn rules(&self) -> Result<RuleConfiguration, ConfigurationError> {
        RuleConfiguration::new(self.rules.threshold, &self.rules.watchlist)
    }

    pub fn batch_options(&self) -> Result<BatchOptions, ConfigurationError> {
        BatchOptions::new(
            self.batch.jobs,
            Duration::from_secs(self.batch.document_timeout_secs),
        )
    }
}

/// How a batch is scheduled. `jobs == 1` means strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    jobs: usize,
    document_timeout: Duration,
}

impl BatchOptions {
    pub fn new(jobs: usize, document_timeout: Duration) -> Result<Self, ConfigurationError> {
        if jobs == 0 {
            return Err(ConfigurationError::InvalidJobs);
        }
        Ok(Self {
            jobs,
            document_timeout,
        })
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn document_timeout(&self) -> Duration {
        self.document_timeout
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            document_timeout: Duration::from_secs(DEFAULT_DOCUMENT_TIMEOUT_SECS),
        }
    }
}

/// Spending threshold plus vendor watchlist, as supplied for one batch.
///
/// Watchlist entries are trimmed, non-empty and distinct (ignoring case);
/// the first spelling of a vendor wins and configuration order is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfiguration {
    threshold: f64,
    watchlist: Vec<String>,
}

impl RuleConfiguration {
    /// Build from a threshold and raw watchlist text (one vendor per line).
    pub fn new(threshold: f64, watchlist_lines: &str) -> Result<Self, ConfigurationError> {
        Self::from_vendors(threshold, watchlist_lines.lines())
    }

    pub fn from_vendors<I, S>(threshold: f64, vendors: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigurationError::InvalidThreshold(threshold));
        }

        let mut watchlist: Vec<String> = Vec::new();
        for vendor in vendors {
            let vendor = vendor.as_ref().trim();
            if vendor.is_empty() {
                continue;
            }
            let lowered = vendor.to_lowercase();
            if watchlist.iter().any(|v| v.to_lowercase() == lowered) {
                continue;
            }
            watchlist.push(vendor.to_string());
        }

        Ok(Self {
            threshold,
            watchlist,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn watchlist(&self) -> &[String] {
        &self.watchlist
    }

    /// Compile one whole-word, case-insensitive matcher per watchlist vendor.
    pub fn compile(&self) -> Result<CompiledRules, ConfigurationError> {
        let vendors = self
            .watchlist
            .iter()
            .map(|vendor| {
                vendor_pattern(vendor).map(|pattern| VendorRule {
                    name: vendor.clone(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledRules {
            threshold: self.threshold,
            vendors,
        })
    }
}

/// Word boundaries are only anchored on ends that are word characters, so a
/// name such as `Acme Inc.` still matches before whitespace or end of text.
fn vendor_pattern(vendor: &str) -> Result<Regex, ConfigurationError> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if vendor.chars().next().is_some_and(is_word) { r"\b" } else { "" };
    let tail = if vendor.chars().last().is_some_and(is_word) { r"\b" } else { "" };

    RegexBuilder::new(&format!("{lead}{}{tail}", regex::escape(vendor)))
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigurationError::VendorPattern {
            vendor: vendor.to_string(),
            source,
        })
}

#[derive(Debug, Clone)]
pub struct VendorRule {
    pub name: String,
    pub pattern: Regex,
}

impl VendorRule {
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Rules ready for the scorer. Read-only and shared across a batch.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub threshold: f64,
    pub vendors: Vec<VendorRule>,
}
