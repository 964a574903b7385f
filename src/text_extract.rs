// src/text_extract.rs

use crate::error::ExtractionError;
use lopdf::Document;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Turns a document's raw bytes into plain text.
///
/// Implementations must be pure functions of the input bytes; the batch
/// orchestrator may call them from several worker threads at once.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// PDF text extractor: structural check with `lopdf`, text via `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        extract_text_from_pdf(bytes)
    }
}

/// Share of image-only pages at which the whole PDF counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

/// Main entry point: takes raw PDF bytes and returns the page-concatenated text.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    // --- Phase 1: structural check with lopdf ---
    let doc = Document::load_mem(pdf_bytes).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    if doc.is_encrypted() {
        info!("PDF is encrypted");
        return Err(ExtractionError::Encrypted);
    }

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return Err(ExtractionError::ScannedImage);
    }

    // --- Phase 2: per-page text extraction ---
    // pdf-extract panics on some malformed content streams.
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
    }))
    .map_err(|_| ExtractionError::Parse("PDF text layer could not be decoded".to_string()))?
    .map_err(|e| {
        warn!(error = %e, "pdf-extract failed");
        ExtractionError::Parse(e.to_string())
    })?;

    let text = join_pages(pages.iter().map(String::as_str));
    info!(pages = pages.len(), chars = text.len(), "Text extracted");
    Ok(text)
}

/// Pages are separated by a newline so the last line of one page never runs
/// into the first line of the next.
fn join_pages<'a>(pages: impl Iterator<Item = &'a str>) -> String {
    let mut text = String::new();
    for page in pages {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(page);
    }
    text
}

/// Heuristic: inspect the PDF object tree for signs that every page
/// is just a single image with no text operators.
///
/// A page with XObject images but **no** Font resources is almost
/// certainly a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let image_only_pages = pages
        .values()
        .filter(|object_id| {
            let Ok(page_dict) = doc.get_dictionary(**object_id) else {
                return false;
            };
            let resources = page_dict
                .get(b"Resources")
                .ok()
                .and_then(|r| doc.dereference(r).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok());

            let has_resource = |key: &[u8]| {
                resources
                    .and_then(|res| res.get(key).ok())
                    .and_then(|o| doc.dereference(o).ok())
                    .and_then(|(_, resolved)| resolved.as_dict().ok())
                    .is_some_and(|dict| !dict.is_empty())
            };

            has_resource(b"XObject") && !has_resource(b"Font")
        })
        .count();

    let ratio = image_only_pages as f64 / pages.len() as f64;
    debug!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= SCANNED_PAGE_RATIO
}
