//! Price text parsing
//!
//! Price nodes hold localized, human-formatted text ("$10.00", "1.234,56 €",
//! "USD 12"). Parsing tries an ordered list of patterns; the first pattern
//! whose captured amount normalizes to a value greater than zero wins.
//!
//! Pattern order:
//! 1. currency symbol before the amount
//! 2. currency symbol after the amount
//! 3. bare decimal amount (must carry a fractional part)
//! 4. ISO currency code before the amount
//! 5. ISO currency code after the amount

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::ExtractionError;

/// Which price pattern produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricePattern {
    SymbolPrefixed,
    SymbolSuffixed,
    BareDecimal,
    CodePrefixed,
    CodeSuffixed,
}

/// A successfully parsed price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedPrice {
    /// Amount as a decimal number
    pub value: f64,
    /// Pattern that matched
    pub pattern: PricePattern,
}

/// Compiled price pattern
#[derive(Debug)]
pub struct PriceMatcher {
    pattern: PricePattern,
    regex: Regex,
}

impl PriceMatcher {
    /// Which pattern this matcher implements
    pub fn pattern(&self) -> PricePattern {
        self.pattern
    }

    /// Amount text captured by this matcher, if any
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.name("amount"))
            .map(|m| m.as_str())
    }
}

const SYMBOL: &str = r"(?:US\$|C\$|A\$|R\$|[$€£¥₹₩₽₺₪₫₴₦฿¢]|kr|zł|Kč)";

// Grouped amounts first (1,234.56 / 1.234,56 / 1 234,56), then plain ones.
const AMOUNT: &str = r"(?P<amount>\d{1,3}(?:[\s'.,]\d{3})+(?:[.,]\d+)?|\d+(?:[.,]\d+)?)";

const DECIMAL: &str =
    r"(?P<amount>\d{1,3}(?:[\s'.,]\d{3})*[.,]\d{1,2}|\d+[.,]\d{1,2})";

/// The ordered price matchers, compiled once
pub fn matchers() -> &'static [PriceMatcher] {
    static MATCHERS: OnceLock<Vec<PriceMatcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let sources = [
            (PricePattern::SymbolPrefixed, format!(r"{SYMBOL}\s*{AMOUNT}")),
            (PricePattern::SymbolSuffixed, format!(r"{AMOUNT}\s*{SYMBOL}")),
            (PricePattern::BareDecimal, format!(r"(?:^|[^\d.,]){DECIMAL}(?:$|[^\d])")),
            (PricePattern::CodePrefixed, format!(r"\b[A-Z]{{3}}\s*{AMOUNT}")),
            (PricePattern::CodeSuffixed, format!(r"{AMOUNT}\s*[A-Z]{{3}}\b")),
        ];
        sources
            .into_iter()
            .filter_map(|(pattern, source)| match Regex::new(&source) {
                Ok(regex) => Some(PriceMatcher { pattern, regex }),
                Err(e) => {
                    debug_assert!(false, "price pattern {:?} does not compile: {}", pattern, e);
                    warn!(pattern = ?pattern, error = %e, "price pattern does not compile, skipping it");
                    None
                }
            })
            .collect()
    })
}

/// Parse the text of a price node
///
/// # Errors
///
/// - [`ExtractionError::NonPositive`] when patterns matched but none produced
///   a value above zero
/// - [`ExtractionError::Unparsable`] when no pattern matched at all
pub fn parse_price(text: &str) -> Result<ParsedPrice, ExtractionError> {
    let text = text.trim();
    let mut non_positive = None;

    for matcher in matchers() {
        let Some(amount) = matcher.capture(text) else {
            continue;
        };
        let Some(value) = normalize_amount(amount) else {
            continue;
        };
        if value > 0.0 {
            return Ok(ParsedPrice {
                value,
                pattern: matcher.pattern(),
            });
        }
        non_positive.get_or_insert(value);
    }

    match non_positive {
        Some(value) => Err(ExtractionError::NonPositive {
            text: text.to_string(),
            value,
        }),
        None => Err(ExtractionError::Unparsable {
            text: text.to_string(),
        }),
    }
}

/// Normalize a localized amount to a number
///
/// - When both `.` and `,` occur, the last one is the decimal separator
/// - A separator occurring more than once is a thousands separator
/// - A single separator followed by exactly three digits, with a non-zero
///   integer part, is a thousands separator
/// - Anything else is a decimal separator
///
/// Spaces and apostrophes are grouping and are dropped.
pub fn normalize_amount(raw: &str) -> Option<f64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();

    let last_dot = compact.rfind('.');
    let last_comma = compact.rfind(',');

    let decimal_at = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => Some(dot.max(comma)),
        (Some(at), None) | (None, Some(at)) => {
            let separator = compact[at..].chars().next()?;
            let occurrences = compact.matches(separator).count();
            let fraction_len = compact.len() - at - 1;
            let integer_part = &compact[..at];
            let grouping = occurrences > 1
                || (fraction_len == 3 && !integer_part.trim_start_matches('0').is_empty());
            (!grouping).then_some(at)
        }
        (None, None) => None,
    };

    let mut normalized = String::with_capacity(compact.len());
    for (i, c) in compact.char_indices() {
        match c {
            '0'..='9' => normalized.push(c),
            '.' | ',' if Some(i) == decimal_at => normalized.push('.'),
            '.' | ',' => {}
            _ => return None,
        }
    }

    normalized.parse().ok()
}
