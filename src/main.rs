mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands, RuleArgs};
use invoice_audit::heuristics::{self, detect_amounts_by_line};
use invoice_audit::text_extract::{PdfTextExtractor, TextExtractor};
use invoice_audit::{Auditor, BatchReport, Config, Document, Progress, report, scoring};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long exit waits for extraction threads that outlived their timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();

    // init tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;
    let outcome = runtime.block_on(run(cli));
    shutdown(runtime);
    outcome
}

/// Stop the runtime without waiting on blocking tasks that are still stuck
/// in an extraction.
fn shutdown(runtime: Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Audit {
            paths,
            rules,
            jobs,
            timeout_secs,
            csv,
            json,
        } => {
            let rules = rules.resolve(&config)?.compile()?;
            let options = cli::batch_options(&config, jobs, timeout_secs)?;
            let documents = load_documents(&paths)?;
            let auditor = Auditor::new(rules).with_options(options);

            let report = run_batch(&auditor, documents).await;

            if let Some(path) = csv {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                report::write_csv(BufWriter::new(file), &report.results)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), rows = report.results.len(), "Wrote CSV report");
            }

            let stdout = io::stdout();
            let mut out = stdout.lock();
            if json {
                report::write_json(&mut out, &report)?;
                writeln!(out)?;
            } else {
                write!(out, "{}", report::render_table(&report))?;
            }
            Ok(())
        }
        Commands::Inspect {
            file,
            rules,
            preview_chars,
        } => inspect(&file, &rules, &config, preview_chars),
        Commands::CheckConfig { rules } => {
            let rules = rules.resolve(&config)?;
            rules.compile()?;
            println!("Threshold: {}", scoring::format_usd(rules.threshold()));
            println!("Watchlist ({} vendors):", rules.watchlist().len());
            for vendor in rules.watchlist() {
                println!("  - {vendor}");
            }
            println!("Configuration OK");
            Ok(())
        }
    }
}

/// Run the batch, stopping early (after the document in progress) on Ctrl-C.
/// A second Ctrl-C exits immediately.
///
/// Every document goes through the timed path, so with `jobs = 1` documents
/// are still audited one at a time but a hung extraction cannot stall the batch.
async fn run_batch(auditor: &Auditor, documents: Vec<Document>) -> BatchReport {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received; no further documents will be started (Ctrl-C again to quit)");
        flag.store(true, Ordering::SeqCst);
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt; exiting without a report");
            std::process::exit(130);
        }
    });

    let progress = |p: Progress| {
        info!(
            completed = p.completed,
            total = p.total,
            progress = format!("{:.0}%", p.fraction() * 100.0),
            "Progress"
        );
        if interrupted.load(Ordering::SeqCst) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };

    auditor.run_concurrent(documents, progress).await
}

/// Expand directories to their `*.pdf` files (sorted); files are taken as given.
fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut pdfs: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("listing {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_pdf(p))
                .collect();
            pdfs.sort();
            if pdfs.is_empty() {
                warn!(dir = %path.display(), "No PDF files in directory");
            }
            files.extend(pdfs);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("no such file or directory: {}", path.display());
        }
    }

    info!(count = files.len(), "Documents queued for audit");
    files
        .iter()
        .map(|p| Document::read(p).with_context(|| format!("reading {}", p.display())))
        .collect()
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Walk one file through each pipeline stage and print what every stage saw.
fn inspect(file: &Path, rules: &RuleArgs, config: &Config, preview_chars: usize) -> Result<()> {
    let rules = rules.resolve(config)?.compile()?;
    let document = Document::read(file).with_context(|| format!("reading {}", file.display()))?;
    info!(filename = %document.name, bytes = document.content.len(), "Loaded document");

    let text = match PdfTextExtractor.extract(&document.content) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "PDF extraction failed");
            println!("\n✗ Error: {e}\n");
            return Ok(());
        }
    };

    println!("\n--- Extracted Text (first {preview_chars} chars) ---");
    println!("{}", text.chars().take(preview_chars).collect::<String>());
    println!("--- End ---\n");

    println!("--- Detected Amounts ---");
    let lines: Vec<&str> = text.lines().collect();
    for amount in detect_amounts_by_line(&text) {
        let line_no = amount.line.unwrap_or_default();
        let line = lines.get(line_no).map_or("", |l| l.trim());
        println!("  line {:>4}  {:>14}  {line}", line_no + 1, scoring::format_usd(amount.value));
    }

    let resolved = heuristics::resolve_total(&text);
    println!(
        "--- Resolved total: {} ({}, {} keyword / {} total candidates) ---",
        scoring::format_usd(resolved.value),
        resolved.method,
        resolved.keyword_candidates,
        resolved.all_candidates
    );
    if let Some(line) = resolved.keyword_line {
        println!("    from line {}: {}", line + 1, lines.get(line).map_or("", |l| l.trim()));
    }

    let assessment = scoring::assess(resolved.value, None, &text, &rules);
    println!(
        "\nStatus: {} (score {})",
        assessment.status, assessment.score
    );
    for reason in &assessment.reasons {
        println!("  - {reason}");
    }
    Ok(())
}
