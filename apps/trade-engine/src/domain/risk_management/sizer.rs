//! Fixed-fractional position sizing.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::errors::RiskError;
use crate::domain::shared::Money;

/// Result of a sizing calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSize {
    /// Whole shares to trade.
    pub shares: u64,
    /// Dollars put at risk (`account_value × risk_percent`), rounded to cents.
    pub dollar_risk: Money,
}

/// Sizes positions so that a stop-out loses a fixed share of the account.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSizer;

impl PositionSizer {
    /// Create a sizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// `shares = floor(account_value × risk_percent / |entry − stop|)`.
    ///
    /// `risk_percent` is a percentage (2 means 2%).
    ///
    /// # Errors
    ///
    /// `InvalidRiskInput` when `entry_price == stop_price`, the account value
    /// is not positive, a price is not positive, or the percentage is outside
    /// (0, 100].
    pub fn size(
        &self,
        account_value: Money,
        risk_percent: Decimal,
        entry_price: Decimal,
        stop_price: Decimal,
    ) -> Result<PositionSize, RiskError> {
        if !account_value.is_positive() {
            return Err(RiskError::invalid_input(format!(
                "account value must be positive, got {account_value}"
            )));
        }
        if risk_percent <= Decimal::ZERO || risk_percent > Decimal::ONE_HUNDRED {
            return Err(RiskError::invalid_input(format!(
                "risk percent must be in (0, 100], got {risk_percent}"
            )));
        }
        if entry_price <= Decimal::ZERO || stop_price <= Decimal::ZERO {
            return Err(RiskError::invalid_input(format!(
                "prices must be positive, got entry={entry_price} stop={stop_price}"
            )));
        }
        if entry_price == stop_price {
            return Err(RiskError::invalid_input(format!(
                "entry price equals stop price ({entry_price})"
            )));
        }

        let raw_risk = account_value.amount() * risk_percent / Decimal::ONE_HUNDRED;
        let per_share = (entry_price - stop_price).abs();
        let shares = (raw_risk / per_share)
            .floor()
            .to_u64()
            .ok_or_else(|| RiskError::invalid_input("share count does not fit in u64"))?;

        Ok(PositionSize {
            shares,
            dollar_risk: Money::new(raw_risk).round_cents(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test]
    fn normal_risk_scenario() {
        let size = PositionSizer::new()
            .size(Money::new(dec!(10000)), dec!(2), dec!(180.50), dec!(178.00))
            .unwrap();
        assert_eq!(size.shares, 80);
        assert_eq!(size.dollar_risk, Money::new(dec!(200.00)));
    }

    #[test]
    fn short_side_uses_absolute_distance() {
        let size = PositionSizer::new()
            .size(Money::new(dec!(10000)), dec!(1), dec!(50), dec!(52))
            .unwrap();
        assert_eq!(size.shares, 50);
    }

    #[test]
    fn rounds_shares_down() {
        let size = PositionSizer::new()
            .size(Money::new(dec!(10000)), dec!(2), dec!(100), dec!(97))
            .unwrap();
        assert_eq!(size.shares, 66);
    }

    #[test]
    fn tiny_account_can_size_to_zero() {
        let size = PositionSizer::new()
            .size(Money::new(dec!(100)), dec!(1), dec!(500), dec!(450))
            .unwrap();
        assert_eq!(size.shares, 0);
    }

    #[test_case(dec!(0), dec!(2), dec!(180.5), dec!(178) ; "zero account")]
    #[test_case(dec!(-5), dec!(2), dec!(180.5), dec!(178) ; "negative account")]
    #[test_case(dec!(10000), dec!(2), dec!(180.5), dec!(180.5) ; "entry equals stop")]
    #[test_case(dec!(10000), dec!(0), dec!(180.5), dec!(178) ; "zero percent")]
    #[test_case(dec!(10000), dec!(2), dec!(-1), dec!(178) ; "negative entry")]
    fn invalid_inputs(account: Decimal, pct: Decimal, entry: Decimal, stop: Decimal) {
        let err = PositionSizer::new()
            .size(Money::new(account), pct, entry, stop)
            .unwrap_err();
        assert!(matches!(err, RiskError::InvalidRiskInput { .. }));
    }
}
