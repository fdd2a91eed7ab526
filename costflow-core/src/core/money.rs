//! Fixed-point money helpers
//!
//! Recipe quantities and intermediate costs keep up to [`COST_SCALE`]
//! fractional digits. Currency figures are rounded to [`CURRENCY_SCALE`]
//! only when they are written to an order.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Fractional digits kept for product unit costs and recipe math
pub const COST_SCALE: u32 = 4;

/// Fractional digits of persisted currency totals
pub const CURRENCY_SCALE: u32 = 2;

/// Minimum cost delta treated as a real change (one cent)
pub const DEFAULT_COST_EPSILON: Decimal = dec!(0.01);

const HUNDRED: Decimal = dec!(100);

/// Round an intermediate cost to [`COST_SCALE`] digits
#[inline]
pub fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a currency total to [`CURRENCY_SCALE`] digits
#[inline]
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * percent / 100`
#[inline]
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / HUNDRED
}

/// Whether `old -> new` moved by at least `epsilon`
#[inline]
pub fn is_significant_change(old: Decimal, new: Decimal, epsilon: Decimal) -> bool {
    (new - old).abs() >= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_currency_midpoint_away_from_zero() {
        assert_eq!(round_currency(dec!(2.005)), dec!(2.01));
        assert_eq!(round_currency(dec!(-2.005)), dec!(-2.01));
        assert_eq!(round_currency(dec!(2.0049)), dec!(2.00));
    }

    #[test]
    fn test_round_cost_keeps_four_digits() {
        assert_eq!(round_cost(dec!(1.23456)), dec!(1.2346));
        assert_eq!(round_cost(dec!(0.33333333)), dec!(0.3333));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(dec!(200), dec!(12.5)), dec!(25));
    }

    #[test]
    fn test_epsilon_boundary() {
        assert!(!is_significant_change(dec!(4.00), dec!(4.009), DEFAULT_COST_EPSILON));
        assert!(is_significant_change(dec!(4.00), dec!(4.01), DEFAULT_COST_EPSILON));
        assert!(is_significant_change(dec!(4.00), dec!(3.99), DEFAULT_COST_EPSILON));
    }
}
