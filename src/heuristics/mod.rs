// src/heuristics/mod.rs

mod amounts;
mod total;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

pub use amounts::{detect_amounts, detect_amounts_by_line, detect_amounts_in_line};
pub use total::{TOTAL_KEYWORDS, resolve_total};

/// A USD amount found in document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonetaryAmount {
    pub value: f64,
    /// The numeric token as printed, separators included.
    pub raw: String,
    /// Byte range of the numeric token in the scanned text (or line).
    pub span: Range<usize>,
    /// Zero-based line index, set only in line-scoped mode.
    pub line: Option<usize>,
}

/// How the invoice total was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// Largest amount on a line carrying a total-style keyword.
    #[serde(rename = "Keyword Match")]
    KeywordMatch,
    /// No keyword line had amounts; largest amount anywhere (or zero).
    #[serde(rename = "Max Value Fallback")]
    MaxFallback,
}

impl ResolutionMethod {
    pub fn label(self) -> &'static str {
        match self {
            ResolutionMethod::KeywordMatch => "Keyword Match",
            ResolutionMethod::MaxFallback => "Max Value Fallback",
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of total resolution for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTotal {
    pub value: f64,
    pub method: ResolutionMethod,
    /// Line the winning keyword amount sat on.
    pub keyword_line: Option<usize>,
    pub keyword_candidates: usize,
    pub all_candidates: usize,
}

impl ResolvedTotal {
    /// True when no monetary amount was found anywhere.
    pub fn is_empty(&self) -> bool {
        self.all_candidates == 0
    }
}
