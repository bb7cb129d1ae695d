//! Small numeric and timing helpers shared across indent_core.

use std::time::Duration;

/// Format a value with exactly two decimals, as written to the tabular log.
///
/// Negative zero is normalized so `-0.001` logs as `0.00`, not `-0.00`.
#[inline]
pub fn two_decimals(v: f64) -> String {
    let s = format!("{v:.2}");
    if s == "-0.00" { "0.00".to_string() } else { s }
}

/// Round to the two-decimal precision of the tabular log.
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `Duration` to whole milliseconds, saturating.
#[inline]
pub fn as_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_decimals_normalizes_negative_zero() {
        assert_eq!(two_decimals(-0.001), "0.00");
        assert_eq!(two_decimals(5.5), "5.50");
        assert_eq!(two_decimals(-1.236), "-1.24");
    }

    #[test]
    fn round2_matches_formatted_value() {
        for v in [0.0, 1.004, -2.499, 12.345_678] {
            let parsed: f64 = two_decimals(v).parse().unwrap();
            assert!((round2(v) - parsed).abs() < 1e-9, "{v}");
        }
    }
}
