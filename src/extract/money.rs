//! Stage C: the monetary value of an offer.

use regex::Regex;

use crate::error::VocabularyError;
use crate::offer::model::MIN_VALID_VALUE;

/// A number next to a currency marker, on either side.
///
/// Group 1 is the number after the marker, group 2 the number before it.
const MONEY_PATTERN: &str = concat!(
    r"(?i)(?:(?:€|\beur\b)[ \t]*(\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)(?:\b|$))",
    r"|(?:\b(\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)[ \t]*(?:€|eur\b))",
);

/// A number directly followed by a distance or duration unit.
const UNIT_TAIL_PATTERN: &str = r"(?i)^\s*(?:km|min|m\b)";

#[derive(Debug, Clone, PartialEq)]
struct MoneyCandidate {
    /// Byte offset of the match in the text.
    position: usize,
    /// Whitespace between marker and number, in bytes.
    gap: usize,
    value: String,
}

pub struct MoneyExtractor {
    pattern: Regex,
    unit_tail: Regex,
}

impl MoneyExtractor {
    pub fn new() -> Result<Self, VocabularyError> {
        Ok(Self {
            pattern: Regex::new(MONEY_PATTERN)?,
            unit_tail: Regex::new(UNIT_TAIL_PATTERN)?,
        })
    }

    /// Returns the offer value as "12.34", or `None` when no currency amount
    /// of at least the minimum value is found.
    ///
    /// Expects numerically corrected text.
    pub fn extract(&self, text: &str) -> Option<String> {
        let mut candidates = Vec::new();

        for caps in self.pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(number) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };

            if self.unit_tail.is_match(&text[number.end()..]) {
                continue;
            }

            let Some(value) = normalize_money(number.as_str()) else {
                continue;
            };
            if value < MIN_VALID_VALUE {
                continue;
            }

            let marker_and_gap = whole.len() - number.len();
            let gap = whole
                .as_str()
                .chars()
                .filter(|c| *c == ' ' || *c == '\t')
                .count()
                .min(marker_and_gap);

            candidates.push(MoneyCandidate {
                position: whole.start(),
                gap,
                value: format!("{:.2}", value),
            });
        }

        candidates
            .into_iter()
            .min_by_key(|c| (c.gap, c.position))
            .map(|c| c.value)
    }
}

/// Parses a money number with ambiguous separators.
///
/// With both "," and "." present, the one that occurs last is the decimal
/// separator. With a single kind, repeated occurrences are thousands
/// grouping, and so is a single one followed by exactly three digits.
pub fn normalize_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');

    let canonical = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => {
            if comma > dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (Some(pos), None) => single_separator(&cleaned, ',', pos),
        (None, Some(pos)) => single_separator(&cleaned, '.', pos),
        (None, None) => cleaned,
    };

    let value: f64 = canonical.parse().ok()?;
    value.is_finite().then_some(value)
}

fn single_separator(cleaned: &str, sep: char, last: usize) -> String {
    let occurrences = cleaned.matches(sep).count();
    let digits_after = cleaned.len() - last - 1;
    if occurrences > 1 || digits_after == 3 {
        cleaned.replace(sep, "")
    } else {
        cleaned.replace(sep, ".")
    }
}
