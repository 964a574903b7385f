use super::MonetaryAmount;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::trace;

/// `$1,234.56`, `US$ 75`, `USD 500.00`, `500.00 USD`.
///
/// The numeric token is either grouped in threes (at least one comma) or a
/// plain digit run, each with an optional two-digit fraction. Only spaces and
/// tabs may sit between the marker and the number.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:US\$|\$|\bUSD)[ \t]*",
        r"(?P<pre>[0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]{2})?|[0-9]+(?:\.[0-9]{2})?)",
        r"|",
        r"(?P<post>[0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]{2})?|[0-9]+(?:\.[0-9]{2})?)",
        r"[ \t]*USD\b",
    ))
    .expect("valid regex")
});

/// Scan a whole text span. Spans are relative to `text`.
pub fn detect_amounts(text: &str) -> impl Iterator<Item = MonetaryAmount> + '_ {
    scan(text, None)
}

/// Scan a single line, tagging every amount with `index`.
pub fn detect_amounts_in_line(line: &str, index: usize) -> impl Iterator<Item = MonetaryAmount> + '_ {
    scan(line, Some(index))
}

/// Scan `text` line by line; spans are relative to each line.
pub fn detect_amounts_by_line(text: &str) -> impl Iterator<Item = MonetaryAmount> + '_ {
    text.lines()
        .enumerate()
        .flat_map(|(index, line)| scan(line, Some(index)))
}

fn scan(text: &str, line: Option<usize>) -> impl Iterator<Item = MonetaryAmount> + '_ {
    AMOUNT_RE
        .captures_iter(text)
        .filter_map(move |caps| to_amount(text, &caps, line))
}

fn to_amount(text: &str, caps: &Captures<'_>, line: Option<usize>) -> Option<MonetaryAmount> {
    let (token, well_formed) = match (caps.name("pre"), caps.name("post")) {
        (Some(m), _) => (m, !continues_number(text[m.end()..].chars())),
        (None, Some(m)) => (m, !continues_number(text[..m.start()].chars().rev())),
        (None, None) => return None,
    };

    if !well_formed {
        trace!(token = token.as_str(), "Rejected malformed amount");
        return None;
    }

    let value = token
        .as_str()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())?;
    Some(MonetaryAmount {
        value,
        raw: token.as_str().to_string(),
        span: token.range(),
        line,
    })
}

/// Whether the characters adjacent to a token show it was cut out of a longer
/// number: another digit, or a separator followed by a digit.
fn continues_number(mut neighbours: impl Iterator<Item = char>) -> bool {
    match neighbours.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some(',' | '.') => neighbours.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}
