//! Lenient numeric coercion.
//!
//! Source files come from a pt-BR locale: `,` is the decimal separator and
//! `.` groups thousands. Nothing here fails; unparsable text becomes zero.

use serde::Deserialize;

/// How a decimal column writes its separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalConvention {
    /// `1.234,56`: drop every `.`, then read `,` as the decimal point.
    #[default]
    Comma,
    /// `1234.56`: parsed as-is.
    Point,
    /// `Comma` when the text contains a comma, `Point` otherwise.
    Auto,
}

impl DecimalConvention {
    pub fn coerce(self, text: &str) -> f64 {
        match self {
            Self::Comma => coerce_decimal(text),
            Self::Point => parse_or_zero(text.trim()),
            Self::Auto => coerce_decimal_auto(text),
        }
    }
}

/// Comma-decimal coercion: `"1.234,56"` → `1234.56`, `""` → `0.0`.
pub fn coerce_decimal(text: &str) -> f64 {
    let swapped = text.trim().replace('.', "").replace(',', ".");
    parse_or_zero(&swapped)
}

/// Swap separators only when a comma is present, so both `"1.500,00"` and
/// `"1500.00"` read as 1500.
pub fn coerce_decimal_auto(text: &str) -> f64 {
    if text.contains(',') {
        coerce_decimal(text)
    } else {
        parse_or_zero(text.trim())
    }
}

/// Integer coercion for codes and counts.
///
/// Keeps digits and separators only; anything with a separator goes through
/// [`coerce_decimal`] and is truncated. `"1.234"` → 1234, `"abc"` → 0.
pub fn coerce_int(text: &str) -> i64 {
    let kept: String = text
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if kept.is_empty() {
        return 0;
    }
    if kept.contains('.') || kept.contains(',') {
        let value = coerce_decimal(&kept);
        if value.is_finite() {
            return value.trunc() as i64;
        }
        return 0;
    }
    kept.parse::<i64>().unwrap_or(0)
}

fn parse_or_zero(text: &str) -> f64 {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}
