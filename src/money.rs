//! Exact money handling. Every amount is parsed into a `Decimal`, rounded
//! half-up to two places and carried as integer cents from then on.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Rounds to `dp` decimal places, ties away from zero.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round2(value: Decimal) -> Decimal {
    round_half_up(value, 2)
}

/// Parses a locale-flexible numeric string.
///
/// Whitespace is stripped, a comma is read as the decimal separator when the
/// string has no period, and every character other than digits, `.` and `-`
/// is dropped. Returns `None` for anything that does not reduce to a number.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let swapped = if compact.contains(',') && !compact.contains('.') {
        compact.replace(',', ".")
    } else {
        compact
    };

    let cleaned: String = swapped
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if matches!(cleaned.as_str(), "" | "-" | "." | "-.") {
        return None;
    }

    Decimal::from_str(&cleaned).ok()
}

/// Largest magnitude accepted for a single amount, in cents. Leaves room
/// for summing many rows in `i64`.
pub const MAX_ABS_CENTS: i64 = 1_000_000_000_000_000;

/// Converts a decimal amount to cents after half-up rounding to 2 places.
/// `None` when the amount is beyond [`MAX_ABS_CENTS`].
pub fn decimal_to_cents(value: Decimal) -> Option<i64> {
    round2(value)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .to_i64()
        .filter(|cents| cents.abs() <= MAX_ABS_CENTS)
}

/// Parses a money string into cents; `None` when the cell is unparseable.
pub fn parse_cents(raw: &str) -> Option<i64> {
    parse_decimal(raw).and_then(decimal_to_cents)
}

/// Parses a rate such as CTR. A `%` suffix marks a percentage.
pub fn parse_rate(raw: &str) -> Option<Decimal> {
    let value = parse_decimal(raw)?;
    if raw.contains('%') {
        Some(value / Decimal::ONE_HUNDRED)
    } else {
        Some(value)
    }
}

pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// `numerator / denominator` rounded once, half away from zero.
/// Returns 0 for a zero denominator.
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    if denominator == 0 {
        return 0;
    }
    let negative = (numerator < 0) != (denominator < 0);
    let n = numerator.abs();
    let d = denominator.abs();
    let rounded = (2 * n + d) / (2 * d);
    if negative {
        -rounded
    } else {
        rounded
    }
}

/// Renders cents with thousands separators, e.g. `123456789` → `"1,234,567.89"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let whole = (abs / 100).to_string();
    let fraction = abs % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}{}.{:02}", sign, grouped, fraction)
}
