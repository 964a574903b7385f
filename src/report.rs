// src/report.rs

use crate::audit::{AuditResult, BatchReport, BatchSummary};
use crate::heuristics::ResolutionMethod;
use crate::scoring::{RiskStatus, format_usd};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Write as _;
use std::io;

pub const CSV_HEADERS: [&str; 6] = [
    "Filename",
    "Detected Total",
    "Logic Used",
    "Status",
    "Risk Score",
    "Issues",
];

/// One exported row. Field order matches `CSV_HEADERS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvRow {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Detected Total", serialize_with = "two_decimals")]
    pub detected_total: f64,
    #[serde(rename = "Logic Used")]
    pub logic_used: ResolutionMethod,
    #[serde(rename = "Status")]
    pub status: RiskStatus,
    #[serde(rename = "Risk Score")]
    pub risk_score: u32,
    #[serde(rename = "Issues")]
    pub issues: String,
}

fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{value:.2}"))
}

impl From<&AuditResult> for CsvRow {
    fn from(r: &AuditResult) -> Self {
        Self {
            filename: r.filename.clone(),
            detected_total: r.resolved_total,
            logic_used: r.resolution_method,
            status: r.status,
            risk_score: r.risk_score,
            issues: r.issues(),
        }
    }
}

/// Write the audit log as UTF-8 CSV: header row, one row per document,
/// no index column. The header is written even for an empty batch.
pub fn write_csv<W: io::Write>(writer: W, results: &[AuditResult]) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(CSV_HEADERS)?;
    for result in results {
        wtr.serialize(CsvRow::from(result))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn csv_bytes(results: &[AuditResult]) -> Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    write_csv(&mut buf, results)?;
    Ok(buf)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    complete: bool,
    summary: BatchSummary,
    results: &'a [AuditResult],
}

pub fn write_json<W: io::Write>(writer: W, report: &BatchReport) -> serde_json::Result<()> {
    let doc = JsonReport {
        complete: report.is_complete(),
        summary: report.summary(),
        results: &report.results,
    };
    serde_json::to_writer_pretty(writer, &doc)
}

/// Fixed-width table plus the batch summary, for terminals.
pub fn render_table(report: &BatchReport) -> String {
    let rows: Vec<[String; 6]> = report
        .results
        .iter()
        .map(|r| {
            [
                r.filename.clone(),
                format_usd(r.resolved_total),
                r.resolution_method.to_string(),
                r.status.to_string(),
                r.risk_score.to_string(),
                r.issues(),
            ]
        })
        .collect();

    let mut widths = CSV_HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[&str]| {
        let last = cells.len() - 1;
        for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
            if i == last {
                out.push_str(cell);
            } else {
                let _ = write!(out, "{cell:<width$}  ");
            }
        }
        out.push('\n');
    };

    push_row(&CSV_HEADERS);
    for row in &rows {
        push_row(&row.each_ref().map(String::as_str));
    }

    let summary = report.summary();
    let _ = write!(
        out,
        "\nFiles processed: {}\nTotal value audited: {}\nHigh risk invoices: {}\n",
        summary.documents,
        format_usd(summary.total_value),
        summary.high_risk,
    );
    if !report.is_complete() {
        let _ = writeln!(
            out,
            "Batch stopped early: {} of {} documents audited",
            summary.documents, report.requested
        );
    }
    out
}
