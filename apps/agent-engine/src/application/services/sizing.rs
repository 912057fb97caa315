//! Position sizing from account equity and decision confidence.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::application::ports::AccountSnapshot;

/// Fixed-fraction sizer scaled by confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSizer {
    max_position_fraction: Decimal,
    precision: u32,
}

impl PositionSizer {
    /// Create a sizer; a non-finite or non-positive fraction sizes nothing.
    #[must_use]
    pub fn new(max_position_fraction: f64, precision: u32) -> Self {
        Self {
            max_position_fraction: Decimal::try_from(max_position_fraction)
                .map_or(Decimal::ZERO, |d| d.round_dp(8)),
            precision,
        }
    }

    /// Quantity for a new position: `equity × fraction × confidence/100 / price`,
    /// rounded down. `None` when the result is not positive.
    #[must_use]
    pub fn size(&self, account: &AccountSnapshot, confidence: f64, price: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO || account.equity <= Decimal::ZERO {
            return None;
        }
        let confidence = Decimal::try_from(confidence.clamp(0.0, 100.0)).ok()?;
        let notional = account.equity * self.max_position_fraction * confidence / Decimal::ONE_HUNDRED;
        let notional = notional.min(account.buying_power.max(Decimal::ZERO));
        let quantity = (notional / price)
            .round_dp_with_strategy(self.precision, RoundingStrategy::ToZero);
        (quantity > Decimal::ZERO).then_some(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(equity: Decimal) -> AccountSnapshot {
        AccountSnapshot {
            equity,
            cash: equity,
            buying_power: equity,
        }
    }

    #[test]
    fn test_size_scales_with_confidence() {
        let sizer = PositionSizer::new(0.1, 6);
        assert_eq!(sizer.size(&account(dec!(100000)), 50.0, dec!(100)), Some(dec!(50)));
        assert_eq!(sizer.size(&account(dec!(100000)), 100.0, dec!(100)), Some(dec!(100)));
    }

    #[test]
    fn test_size_rounds_down() {
        let sizer = PositionSizer::new(0.1, 2);
        assert_eq!(sizer.size(&account(dec!(1000)), 100.0, dec!(3)), Some(dec!(33.33)));
    }

    #[test]
    fn test_size_is_capped_by_buying_power() {
        let sizer = PositionSizer::new(0.5, 6);
        let mut acct = account(dec!(10000));
        acct.buying_power = dec!(1000);
        assert_eq!(sizer.size(&acct, 100.0, dec!(10)), Some(dec!(100)));
    }

    #[test]
    fn test_zero_confidence_or_price_is_signal_only() {
        let sizer = PositionSizer::new(0.1, 6);
        assert_eq!(sizer.size(&account(dec!(1000)), 0.0, dec!(10)), None);
        assert_eq!(sizer.size(&account(dec!(1000)), 80.0, Decimal::ZERO), None);
        assert_eq!(sizer.size(&account(Decimal::ZERO), 80.0, dec!(10)), None);
    }
}
