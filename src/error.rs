use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a document produced no readable text.
///
/// These never abort a batch: the orchestrator folds the message into the
/// document's reasons and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("PDF appears to be scanned / image-only")]
    ScannedImage,

    #[error("Extraction timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Extraction worker stopped: {0}")]
    Aborted(String),
}

/// Problems with the rule configuration. Surfaced before any document is read.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("threshold must be a finite, non-negative number (got {0})")]
    InvalidThreshold(f64),

    #[error("watchlist entry '{vendor}' cannot be used as a match pattern: {source}")]
    VendorPattern {
        vendor: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("batch.jobs must be at least 1")]
    InvalidJobs,
}
