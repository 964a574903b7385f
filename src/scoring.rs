// src/scoring.rs

use crate::config::CompiledRules;
use crate::error::ExtractionError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

pub const EXTRACTION_FAILURE_POINTS: u32 = 25;
pub const THRESHOLD_POINTS: u32 = 50;
pub const WATCHLIST_POINTS: u32 = 100;

/// Score at which a document is high risk. Only a watchlist hit can reach it:
/// extraction failure plus threshold is 75.
pub const HIGH_RISK_SCORE: u32 = WATCHLIST_POINTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskStatus {
    #[serde(rename = "Approved")]
    Approved,
    #[serde(rename = "Medium Risk")]
    MediumRisk,
    #[serde(rename = "High Risk")]
    HighRisk,
}

impl RiskStatus {
    pub fn from_score(score: u32) -> Self {
        match score {
            0 => RiskStatus::Approved,
            s if s >= HIGH_RISK_SCORE => RiskStatus::HighRisk,
            _ => RiskStatus::MediumRisk,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskStatus::Approved => "Approved",
            RiskStatus::MediumRisk => "Medium Risk",
            RiskStatus::HighRisk => "High Risk",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One triggered rule. Rendered as a sentence in reports.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    /// The extractor failed outright.
    ExtractionError(ExtractionError),
    /// Text was read but no amount resolved to a non-zero total.
    NoAmountsDetected,
    ThresholdExceeded { amount: f64, threshold: f64 },
    WatchlistVendor(String),
}

impl Reason {
    pub fn points(&self) -> u32 {
        match self {
            Reason::ExtractionError(_) | Reason::NoAmountsDetected => EXTRACTION_FAILURE_POINTS,
            Reason::ThresholdExceeded { .. } => THRESHOLD_POINTS,
            Reason::WatchlistVendor(_) => WATCHLIST_POINTS,
        }
    }

    pub fn is_extraction_failure(&self) -> bool {
        matches!(self, Reason::ExtractionError(_) | Reason::NoAmountsDetected)
    }

    pub fn is_watchlist_hit(&self) -> bool {
        matches!(self, Reason::WatchlistVendor(_))
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ExtractionError(e) => write!(f, "Error reading PDF: {e}"),
            Reason::NoAmountsDetected => f.write_str("Extraction Failed: No dollar amounts detected"),
            Reason::ThresholdExceeded { amount, threshold } => write!(
                f,
                "Amount ({}) exceeds threshold ({})",
                format_usd(*amount),
                format_usd(*threshold)
            ),
            Reason::WatchlistVendor(vendor) => write!(f, "Vendor '{vendor}' found on Watchlist"),
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub status: RiskStatus,
    pub reasons: Vec<Reason>,
}

/// Apply the compliance rules in order: extraction, threshold, watchlist.
///
/// `extraction` is the extractor's error, if any; in that case `text` is
/// expected to be empty and `total` zero.
pub fn assess(
    total: f64,
    extraction: Option<&ExtractionError>,
    text: &str,
    rules: &CompiledRules,
) -> RiskAssessment {
    let mut reasons = Vec::new();

    match extraction {
        Some(err) => reasons.push(Reason::ExtractionError(err.clone())),
        None if total == 0.0 => reasons.push(Reason::NoAmountsDetected),
        None => {}
    }

    if total > rules.threshold {
        reasons.push(Reason::ThresholdExceeded {
            amount: total,
            threshold: rules.threshold,
        });
    }

    reasons.extend(
        rules
            .vendors
            .iter()
            .filter(|vendor| vendor.is_match(text))
            .map(|vendor| Reason::WatchlistVendor(vendor.name.clone())),
    );

    let score = reasons.iter().map(Reason::points).sum();
    RiskAssessment {
        score,
        status: RiskStatus::from_score(score),
        reasons,
    }
}

/// `1234.5` -> `$1,234.50`
pub fn format_usd(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}
