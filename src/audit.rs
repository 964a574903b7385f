// src/audit.rs

use crate::config::{BatchOptions, CompiledRules};
use crate::error::ExtractionError;
use crate::heuristics::{self, ResolutionMethod};
use crate::scoring::{self, Reason, RiskStatus};
use crate::text_extract::{PdfTextExtractor, TextExtractor};
use futures_util::{StreamExt, stream};
use serde::Serialize;
use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::{fs, io};
use tracing::{info, info_span, warn};

/// One uploaded invoice.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub content: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a file from disk, named after its final path component.
    pub fn read(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, fs::read(path)?))
    }
}

/// Audit outcome for a single document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResult {
    pub filename: String,
    pub resolved_total: f64,
    pub resolution_method: ResolutionMethod,
    pub risk_score: u32,
    pub status: RiskStatus,
    pub reasons: Vec<Reason>,
}

impl AuditResult {
    /// Reasons joined the way the exported report shows them.
    pub fn issues(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Derived view over a result list; always recomputed, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub documents: usize,
    pub total_value: f64,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub approved: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[AuditResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            acc.documents += 1;
            acc.total_value += r.resolved_total;
            match r.status {
                RiskStatus::HighRisk => acc.high_risk += 1,
                RiskStatus::MediumRisk => acc.medium_risk += 1,
                RiskStatus::Approved => acc.approved += 1,
            }
            acc
        })
    }
}

/// Emitted after each finished document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Share of the batch done, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Results in input order. Shorter than the input only if the caller aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub results: Vec<AuditResult>,
    pub requested: usize,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_results(&self.results)
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.requested
    }
}

/// Runs the extraction → total resolution → scoring pipeline over a batch.
pub struct Auditor {
    extractor: Arc<dyn TextExtractor>,
    rules: CompiledRules,
    options: BatchOptions,
}

impl Auditor {
    pub fn new(rules: CompiledRules) -> Self {
        Self {
            extractor: Arc::new(PdfTextExtractor),
            rules,
            options: BatchOptions::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: impl TextExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Extract, resolve and score one document on the current thread.
    pub fn audit_document(&self, document: &Document) -> AuditResult {
        let span = info_span!("audit", filename = %document.name);
        let _guard = span.enter();
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.extractor.extract(&document.content)
        }))
        .unwrap_or_else(|payload| Err(ExtractionError::Aborted(panic_message(payload.as_ref()))));
        self.audit_extracted(document.name.clone(), extracted)
    }

    /// Resolve and score an already-extracted document.
    pub fn audit_extracted(
        &self,
        filename: String,
        extracted: Result<String, ExtractionError>,
    ) -> AuditResult {
        let (text, error) = match extracted {
            Ok(text) => {
                info!(chars = text.len(), "Extracted text");
                (text, None)
            }
            Err(e) => {
                warn!(error = %e, "Text extraction failed");
                (String::new(), Some(e))
            }
        };

        let resolved = heuristics::resolve_total(&text);
        let assessment = scoring::assess(resolved.value, error.as_ref(), &text, &self.rules);

        info!(
            total = resolved.value,
            method = %resolved.method,
            score = assessment.score,
            status = %assessment.status,
            reasons = assessment.reasons.len(),
            "Audit result"
        );

        AuditResult {
            filename,
            resolved_total: resolved.value,
            resolution_method: resolved.method,
            risk_score: assessment.score,
            status: assessment.status,
            reasons: assessment.reasons,
        }
    }

    /// Audit documents one after another, in order.
    ///
    /// `progress` is called after every document; returning
    /// `ControlFlow::Break` stops the batch before the next document.
    pub fn run<F>(&self, documents: &[Document], mut progress: F) -> BatchReport
    where
        F: FnMut(Progress) -> ControlFlow<()>,
    {
        let total = documents.len();
        info!(documents = total, "Starting sequential batch");

        let mut results = Vec::with_capacity(total);
        for document in documents {
            results.push(self.audit_document(document));
            let step = Progress {
                completed: results.len(),
                total,
            };
            if progress(step).is_break() {
                warn!(completed = step.completed, total, "Batch aborted by caller");
                break;
            }
        }

        BatchReport {
            results,
            requested: total,
        }
    }

    /// Audit documents with up to `jobs` extractions in flight.
    ///
    /// Extraction runs on the blocking pool under the per-document timeout;
    /// results, progress and the summary still follow input order. With
    /// `jobs = 1` this is a sequential run that cannot hang on one document.
    pub async fn run_concurrent<F>(&self, documents: Vec<Document>, mut progress: F) -> BatchReport
    where
        F: FnMut(Progress) -> ControlFlow<()>,
    {
        let total = documents.len();
        let timeout = self.options.document_timeout();
        info!(
            documents = total,
            jobs = self.options.jobs(),
            timeout = ?timeout,
            "Starting concurrent batch"
        );

        let mut extractions = stream::iter(documents)
            .map(|document| {
                let extractor = Arc::clone(&self.extractor);
                async move {
                    let Document { name, content } = document;
                    let handle = tokio::task::spawn_blocking(move || extractor.extract(&content));
                    let extracted = match tokio::time::timeout(timeout, handle).await {
                        Ok(Ok(extracted)) => extracted,
                        Ok(Err(join_err)) => Err(ExtractionError::Aborted(join_err.to_string())),
                        Err(_) => Err(ExtractionError::TimedOut(timeout)),
                    };
                    (name, extracted)
                }
            })
            .buffered(self.options.jobs());

        let mut results = Vec::with_capacity(total);
        while let Some((name, extracted)) = extractions.next().await {
            let span = info_span!("audit", filename = %name);
            results.push(span.in_scope(|| self.audit_extracted(name, extracted)));

            let step = Progress {
                completed: results.len(),
                total,
            };
            if progress(step).is_break() {
                warn!(completed = step.completed, total, "Batch aborted by caller");
                break;
            }
        }

        BatchReport {
            results,
            requested: total,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "extractor panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfiguration;
    use crate::text_extract::tests::make_test_pdf;
    use std::time::Duration;

    /// Treats document bytes as UTF-8 text; `CORRUPT` fails, `PANIC` panics,
    /// `SLOW` blocks for a while.
    struct PlainText;

    impl TextExtractor for PlainText {
        fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
            match bytes {
                b"CORRUPT" => Err(ExtractionError::Parse("unexpected end of file".into())),
                b"PANIC" => panic!("extractor blew up"),
                b"SLOW" => {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok("Total $1.00".into())
                }
                _ => Ok(String::from_utf8_lossy(bytes).into_owned()),
            }
        }
    }

    fn auditor(threshold: f64, watchlist: &str) -> Auditor {
        let rules = RuleConfiguration::new(threshold, watchlist)
            .unwrap()
            .compile()
            .unwrap();
        Auditor::new(rules).with_extractor(PlainText)
    }

    fn doc(name: &str, text: &str) -> Document {
        Document::new(name, text.as_bytes())
    }

    fn keep_going(_: Progress) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    #[test]
    fn test_keyword_total_over_threshold() {
        let r = auditor(500.0, "").audit_document(&doc("a.pdf", "Invoice Total: $1,234.56"));
        assert_eq!(r.resolved_total, 1234.56);
        assert_eq!(r.resolution_method, ResolutionMethod::KeywordMatch);
        assert_eq!(r.risk_score, 50);
        assert_eq!(r.status, RiskStatus::MediumRisk);
    }

    #[test]
    fn test_watchlist_vendor_below_threshold() {
        let r = auditor(500.0, "Bolton")
            .audit_document(&doc("b.pdf", "Payment to Bolton Inc for $10.00"));
        assert_eq!(r.resolved_total, 10.0);
        assert_eq!(r.risk_score, 100);
        assert_eq!(r.status, RiskStatus::HighRisk);
        assert_eq!(r.issues(), "Vendor 'Bolton' found on Watchlist");
    }

    #[test]
    fn test_no_amounts() {
        let r = auditor(500.0, "").audit_document(&doc("c.pdf", "No dollar values here"));
        assert_eq!(r.resolved_total, 0.0);
        assert_eq!(r.resolution_method, ResolutionMethod::MaxFallback);
        assert_eq!(r.risk_score, 25);
        assert_eq!(r.status, RiskStatus::MediumRisk);
        assert_eq!(r.issues(), "Extraction Failed: No dollar amounts detected");
    }

    #[test]
    fn test_extraction_error_still_reported() {
        let r = auditor(500.0, "Bolton").audit_document(&Document::new("d.pdf", b"CORRUPT".to_vec()));
        assert_eq!(r.resolved_total, 0.0);
        assert_eq!(r.risk_score, 25);
        assert_eq!(r.status, RiskStatus::MediumRisk);
        assert!(r.issues().contains("unexpected end of file"), "{}", r.issues());
    }

    #[test]
    fn test_street_name_is_not_a_vendor_hit() {
        let r = auditor(500.0, "Bolton")
            .audit_document(&doc("e.pdf", "12 Boltonville Ave\nTotal $20.00"));
        assert_eq!(r.risk_score, 0);
        assert_eq!(r.status, RiskStatus::Approved);
    }

    #[test]
    fn test_real_pdf_through_pipeline() {
        let pdf = make_test_pdf(&[&["Bad Wolf Corp", "Subtotal $700.00", "Invoice Total: $756.00"]]);
        let rules = RuleConfiguration::new(500.0, "Bad Wolf Corp")
            .unwrap()
            .compile()
            .unwrap();
        let r = Auditor::new(rules).audit_document(&Document::new("wolf.pdf", pdf));
        assert_eq!(r.resolved_total, 756.0);
        assert_eq!(r.risk_score, 150);
        assert_eq!(r.status, RiskStatus::HighRisk);
    }

    #[test]
    fn test_batch_keeps_order_and_isolates_failures() {
        let docs = vec![
            doc("1.pdf", "Total $600.00"),
            Document::new("2.pdf", b"CORRUPT".to_vec()),
            doc("3.pdf", "Suspicious LLC\nAmount Due $5.00"),
            doc("4.pdf", "Total $5.00"),
        ];
        let mut seen = Vec::new();
        let report = auditor(500.0, "Suspicious LLC").run(&docs, |p| {
            seen.push(p.fraction());
            ControlFlow::Continue(())
        });

        assert!(report.is_complete());
        let names: Vec<&str> = report.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["1.pdf", "2.pdf", "3.pdf", "4.pdf"]);
        assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);

        let summary = report.summary();
        assert_eq!(summary.documents, 4);
        assert_eq!(summary.total_value, 610.0);
        assert_eq!(summary.high_risk, 1);
        assert_eq!(summary.medium_risk, 2);
        assert_eq!(summary.approved, 1);
    }

    #[test]
    fn test_zero_total_always_explained() {
        let docs = vec![
            doc("a", ""),
            doc("b", "USD 0.00 total"),
            Document::new("c", b"CORRUPT".to_vec()),
        ];
        let report = auditor(500.0, "").run(&docs, keep_going);
        for r in &report.results {
            assert_eq!(r.resolved_total, 0.0);
            assert!(r.reasons.iter().any(Reason::is_extraction_failure), "{r:?}");
        }
    }

    #[test]
    fn test_audit_is_idempotent() {
        let a = auditor(100.0, "Bolton");
        let d = doc("x.pdf", "Bolton\nGrand Total $150.00");
        assert_eq!(a.audit_document(&d), a.audit_document(&d));
    }

    #[test]
    fn test_abort_stops_scheduling() {
        let docs = vec![doc("1", "$1"), doc("2", "$2"), doc("3", "$3")];
        let report = auditor(500.0, "").run(&docs, |p| {
            if p.completed == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(report.results.len(), 2);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_sequential_panic_is_per_document() {
        let docs = vec![
            doc("1.pdf", "Total $5.00"),
            Document::new("2.pdf", b"PANIC".to_vec()),
            doc("3.pdf", "Total $7.00"),
        ];
        let report = auditor(500.0, "").run(&docs, keep_going);

        assert!(report.is_complete());
        assert_eq!(report.results[0].resolved_total, 5.0);
        assert_eq!(
            report.results[1].reasons,
            vec![Reason::ExtractionError(ExtractionError::Aborted(
                "extractor blew up".into()
            ))]
        );
        assert_eq!(report.results[1].status, RiskStatus::MediumRisk);
        assert_eq!(report.results[2].resolved_total, 7.0);
    }

    #[test]
    fn test_empty_batch() {
        let report = auditor(500.0, "").run(&[], keep_going);
        assert!(report.is_complete());
        assert_eq!(report.summary(), BatchSummary::default());
        assert_eq!(Progress { completed: 0, total: 0 }.fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let docs: Vec<Document> = (0..12)
            .map(|i| {
                let vendor = if i % 5 == 0 { "Bolton" } else { "Acme" };
                doc(&format!("{i}.pdf"), &format!("{vendor}\nTotal ${}.00", i * 100))
            })
            .collect();
        let a = auditor(500.0, "Bolton")
            .with_options(BatchOptions::new(4, Duration::from_secs(5)).unwrap());

        let sequential = a.run(&docs, keep_going);
        let mut completed = Vec::new();
        let concurrent = a
            .run_concurrent(docs, |p| {
                completed.push(p.completed);
                ControlFlow::Continue(())
            })
            .await;

        assert_eq!(sequential, concurrent);
        assert_eq!(completed, (1..=12).collect::<Vec<_>>());
        assert_eq!(sequential.summary(), concurrent.summary());
    }

    #[tokio::test]
    async fn test_concurrent_order_survives_uneven_extraction_time() {
        let mut docs = vec![Document::new("slow.pdf", b"SLOW".to_vec())];
        docs.extend((1..6).map(|i| doc(&format!("{i}.pdf"), &format!("Total ${i}.00"))));
        let a = auditor(500.0, "")
            .with_options(BatchOptions::new(4, Duration::from_secs(5)).unwrap());

        let sequential = a.run(&docs, keep_going);
        let concurrent = a.run_concurrent(docs, keep_going).await;

        assert_eq!(concurrent, sequential);
        let names: Vec<&str> = concurrent.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["slow.pdf", "1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf"]);
        assert_eq!(concurrent.results[0].resolved_total, 1.0);
    }

    #[tokio::test]
    async fn test_single_job_still_times_out() {
        let a = auditor(500.0, "")
            .with_options(BatchOptions::new(1, Duration::from_millis(20)).unwrap());
        let docs = vec![
            Document::new("slow.pdf", b"SLOW".to_vec()),
            doc("ok.pdf", "Total $9.00"),
        ];
        let report = a.run_concurrent(docs, keep_going).await;

        assert!(report.is_complete());
        assert_eq!(
            report.results[0].reasons,
            vec![Reason::ExtractionError(ExtractionError::TimedOut(
                Duration::from_millis(20)
            ))]
        );
        assert_eq!(report.results[1].resolved_total, 9.0);
    }

    #[tokio::test]
    async fn test_concurrent_timeout_and_panic_are_per_document() {
        let a = auditor(500.0, "")
            .with_options(BatchOptions::new(3, Duration::from_millis(20)).unwrap());
        let docs = vec![
            Document::new("slow.pdf", b"SLOW".to_vec()),
            Document::new("panic.pdf", b"PANIC".to_vec()),
            doc("ok.pdf", "Total $9.00"),
        ];
        let report = a.run_concurrent(docs, keep_going).await;

        assert!(report.is_complete());
        assert!(report.results[0].reasons.contains(&Reason::ExtractionError(
            ExtractionError::TimedOut(Duration::from_millis(20))
        )));
        assert!(matches!(
            report.results[1].reasons.as_slice(),
            [Reason::ExtractionError(ExtractionError::Aborted(_))]
        ));
        assert_eq!(report.results[2].status, RiskStatus::Approved);
    }

    #[tokio::test]
    async fn test_concurrent_abort() {
        let docs: Vec<Document> = (0..6).map(|i| doc(&i.to_string(), "$1")).collect();
        let a = auditor(500.0, "")
            .with_options(BatchOptions::new(2, Duration::from_secs(5)).unwrap());
        let report = a
            .run_concurrent(docs, |p| {
                if p.completed == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await;
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.requested, 6);
        assert_eq!(report.results[2].filename, "2");
    }
}
