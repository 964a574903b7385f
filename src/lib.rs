//! Batch compliance auditing for PDF invoices.
//!
//! Each document goes through text extraction, total-amount resolution and
//! rule-based risk scoring; a batch yields one [`AuditResult`] per document
//! in input order, exportable as CSV or JSON.

pub mod audit;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod report;
pub mod scoring;
pub mod text_extract;

pub use audit::{AuditResult, Auditor, BatchReport, BatchSummary, Document, Progress};
pub use config::{BatchOptions, CompiledRules, Config, RuleConfiguration};
pub use error::{ConfigurationError, ExtractionError};
pub use heuristics::{MonetaryAmount, ResolutionMethod, ResolvedTotal};
pub use scoring::{Reason, RiskAssessment, RiskStatus};
pub use text_extract::{PdfTextExtractor, TextExtractor};
