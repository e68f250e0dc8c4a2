use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Converts a float price into a `Decimal`, rejecting NaN, infinities and non-positive values.
pub fn positive_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Decimal::from_f64(value).filter(|d| *d > Decimal::ZERO)
}

/// Whether a non-negative price converts to `Decimal` intact. Positive values
/// below `Decimal`'s scale floor (1e-28) or above `Decimal::MAX` do not.
pub fn representable_price(value: f64) -> bool {
    value == 0.0 || positive_decimal(value).is_some()
}

/// Rounds to cents (half away from zero) and hands back a float for the wire.
pub fn round_cents(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

pub fn round_cents_f64(value: f64) -> f64 {
    match Decimal::from_f64(value) {
        Some(d) => round_cents(d),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_cents(Decimal::new(1005, 3)), 1.01);
        assert_eq!(round_cents(Decimal::new(1004, 3)), 1.0);
        assert_eq!(round_cents_f64(0.1 + 0.2), 0.3);
    }

    #[test]
    fn positive_decimal_filters_invalid_values() {
        assert!(positive_decimal(0.0).is_none());
        assert!(positive_decimal(-1.0).is_none());
        assert!(positive_decimal(f64::NAN).is_none());
        assert!(positive_decimal(f64::INFINITY).is_none());
        assert_eq!(positive_decimal(12.5), Some(Decimal::new(125, 1)));
    }

    #[test]
    fn decimal_range_limits() {
        assert!(positive_decimal(1e29).is_none());
        assert!(positive_decimal(1e-29).is_none());
        assert!(representable_price(0.0));
        assert!(representable_price(0.01));
        assert!(representable_price(1e20));
        assert!(!representable_price(1e-29));
        assert!(!representable_price(1e29));
    }
}
