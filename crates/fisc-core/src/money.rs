//! # Money: Decimal Rounding and Fixed-Scale Rendering
//!
//! All monetary arithmetic uses `rust_decimal::Decimal`. Rounding is
//! half-away-from-zero to two decimals, applied at the line level; document
//! totals are sums of already-rounded line values.
//!
//! Rendering helpers always emit the fixed number of decimals the signing
//! input and the audit file expect (`1` renders as `1.00`, never `1`).

use rust_decimal::{Decimal, RoundingStrategy};

/// Round to two decimals, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Render an amount with exactly two decimals.
pub fn format_amount(value: Decimal) -> String {
    format_fixed(value, 2)
}

/// Render a unit price with exactly four decimals.
pub fn format_unit_price(value: Decimal) -> String {
    format_fixed(value, 4)
}

/// Render a quantity with exactly three decimals.
pub fn format_quantity(value: Decimal) -> String {
    format_fixed(value, 3)
}

/// Render a tax percentage with exactly two decimals.
pub fn format_percentage(value: Decimal) -> String {
    format_fixed(value, 2)
}

fn format_fixed(value: Decimal, dp: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    // -0.00 renders as 0.00
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(d("2.345")), d("2.35"));
        assert_eq!(round_money(d("2.344")), d("2.34"));
        assert_eq!(round_money(d("-2.345")), d("-2.35"));
        assert_eq!(round_money(d("0.005")), d("0.01"));
    }

    #[test]
    fn fixed_scale_rendering() {
        assert_eq!(format_amount(d("1")), "1.00");
        assert_eq!(format_amount(d("12.3")), "12.30");
        assert_eq!(format_amount(d("-0.001")), "0.00");
        assert_eq!(format_unit_price(d("10")), "10.0000");
        assert_eq!(format_quantity(d("2.5")), "2.500");
        assert_eq!(format_percentage(d("23")), "23.00");
    }

    proptest! {
        #[test]
        fn rounded_amount_has_at_most_two_decimals(cents in -10_000_000i64..10_000_000, extra in 0u32..1000) {
            let value = Decimal::new(cents * 1000 + i64::from(extra), 5);
            let r = round_money(value);
            prop_assert!(r.scale() <= 2);
            prop_assert!((r - value).abs() <= d("0.005"));
        }

        #[test]
        fn formatted_amount_parses_back(cents in -10_000_000i64..10_000_000) {
            let value = Decimal::new(cents, 2);
            let s = format_amount(value);
            prop_assert_eq!(s.split('.').nth(1).map(str::len), Some(2));
            prop_assert_eq!(Decimal::from_str(&s).unwrap(), value);
        }
    }
}
