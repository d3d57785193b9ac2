//! OHLCV bar value object.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::shared::Timestamp;

/// Reasons a bar is unusable for evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarError {
    /// A price field is zero or negative.
    #[error("{field} price must be positive, got {value}")]
    NonPositivePrice {
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: Decimal,
    },

    /// High/low do not bracket open and close.
    #[error("inconsistent OHLC range: open={open} high={high} low={low} close={close}")]
    InconsistentRange {
        /// Open.
        open: Decimal,
        /// High.
        high: Decimal,
        /// Low.
        low: Decimal,
        /// Close.
        close: Decimal,
    },

    /// The bar carries no traded volume.
    #[error("bar has zero volume")]
    ZeroVolume,
}

/// One completed OHLCV sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: u64,
    /// Time the bar's bucket ended.
    pub close_time: Timestamp,
}

impl Bar {
    /// Check the bar is internally consistent.
    pub fn validate(&self) -> Result<(), BarError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if value <= Decimal::ZERO {
                return Err(BarError::NonPositivePrice { field, value });
            }
        }

        if self.high < self.low
            || self.high < self.open.max(self.close)
            || self.low > self.open.min(self.close)
        {
            return Err(BarError::InconsistentRange {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.volume == 0 {
            return Err(BarError::ZeroVolume);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: u64) -> Bar {
        Bar {
            open,
            high,
            low,
            close,
            volume,
            close_time: Timestamp::parse("2024-03-01T14:30:00Z").unwrap(),
        }
    }

    #[test]
    fn accepts_consistent_bar() {
        assert!(bar(dec!(180), dec!(181), dec!(179.5), dec!(180.75), 12_000)
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = bar(dec!(180), dec!(181), dec!(0), dec!(180.75), 1)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            BarError::NonPositivePrice {
                field: "low",
                value: dec!(0)
            }
        );
    }

    #[test]
    fn rejects_close_outside_range() {
        let err = bar(dec!(180), dec!(181), dec!(179), dec!(182), 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, BarError::InconsistentRange { .. }));
    }

    #[test]
    fn rejects_zero_volume() {
        assert_eq!(
            bar(dec!(180), dec!(181), dec!(179), dec!(180), 0).validate(),
            Err(BarError::ZeroVolume)
        );
    }
}
