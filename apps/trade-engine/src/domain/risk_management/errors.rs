//! Risk errors.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::shared::{Money, PositionId};

/// Errors raised by the risk engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// Sizing inputs are unusable. Raised before any state change.
    #[error("invalid risk input: {message}")]
    InvalidRiskInput {
        /// What is wrong.
        message: String,
    },

    /// A reservation would push portfolio risk over the ceiling.
    #[error(
        "portfolio risk exceeded: {current_total} reserved ({current_percent}%), \
         {attempted_total} requested ({attempted_percent}%) against a {limit_percent}% limit"
    )]
    PortfolioRiskExceeded {
        /// Reserved before the request.
        current_total: Money,
        /// Reserved total had the request succeeded.
        attempted_total: Money,
        /// `current_total` as a percentage of account value.
        current_percent: Decimal,
        /// `attempted_total` as a percentage of account value.
        attempted_percent: Decimal,
        /// Configured ceiling.
        limit_percent: Decimal,
    },

    /// The position already holds a reservation.
    #[error("position {position_id} already holds a risk reservation")]
    DuplicateReservation {
        /// Position.
        position_id: PositionId,
    },

    /// The registry no longer satisfies its own invariant. Fatal.
    #[error("portfolio risk registry corrupted: {message}")]
    RegistryCorrupted {
        /// What was found.
        message: String,
    },
}

impl RiskError {
    /// Shorthand for [`RiskError::InvalidRiskInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidRiskInput {
            message: message.into(),
        }
    }

    /// Whether the process must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::RegistryCorrupted { .. })
    }
}
