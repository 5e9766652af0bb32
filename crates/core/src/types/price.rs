//! Price parsing for loosely typed table-store values.
//!
//! The `price` column has been written by several admin tools over time and
//! arrives as a JSON number, a numeric string, or occasionally `null` or
//! free text. Everything that is not a finite number is treated as zero so
//! sorting and range filters stay total.

use rust_decimal::Decimal;
use serde_json::Value;

/// Parse a wire price into a decimal, falling back to zero.
#[must_use]
pub fn parse_price(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok()))
            .unwrap_or(Decimal::ZERO),
        Value::String(s) => s.trim().parse::<Decimal>().unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}
