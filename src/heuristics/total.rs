use super::amounts::detect_amounts_in_line;
use super::{ResolutionMethod, ResolvedTotal};
use tracing::debug;

/// A line containing any of these (lowercased) marks its amounts as
/// candidates for the invoice total.
pub const TOTAL_KEYWORDS: [&str; 6] = [
    "total",
    "amount due",
    "amount payable",
    "balance due",
    "grand total",
    "invoice total",
];

/// Decide which detected amount is the invoice total.
///
/// Invoices print line items and subtotals next to one grand total, so the
/// largest amount on a keyword line wins; without one we take the largest
/// amount anywhere, and zero when nothing was found.
pub fn resolve_total(text: &str) -> ResolvedTotal {
    let mut keyword_best: Option<(f64, usize)> = None;
    let mut overall_best: Option<f64> = None;
    let mut keyword_candidates = 0;
    let mut all_candidates = 0;

    for (index, line) in text.lines().enumerate() {
        let is_keyword_line = has_total_keyword(line);

        for amount in detect_amounts_in_line(line, index) {
            all_candidates += 1;
            overall_best = Some(overall_best.map_or(amount.value, |best| best.max(amount.value)));

            if is_keyword_line {
                keyword_candidates += 1;
                if keyword_best.is_none_or(|(best, _)| amount.value > best) {
                    keyword_best = Some((amount.value, index));
                }
            }
        }
    }

    let resolved = match (keyword_best, overall_best) {
        (Some((value, line)), _) => ResolvedTotal {
            value,
            method: ResolutionMethod::KeywordMatch,
            keyword_line: Some(line),
            keyword_candidates,
            all_candidates,
        },
        (None, best) => ResolvedTotal {
            value: best.unwrap_or(0.0),
            method: ResolutionMethod::MaxFallback,
            keyword_line: None,
            keyword_candidates,
            all_candidates,
        },
    };

    debug!(
        total = resolved.value,
        method = %resolved.method,
        keyword_candidates,
        all_candidates,
        "Resolved invoice total"
    );
    resolved
}

fn has_total_keyword(line: &str) -> bool {
    let lowered = line.to_lowercase();
    TOTAL_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}
