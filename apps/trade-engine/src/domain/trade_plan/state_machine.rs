//! Trade Plan State Machine
//!
//! ```text
//! awaiting_entry -> position_open -> position_closed
//! awaiting_entry -> cancelled
//! awaiting_entry | position_open -> error
//! ```

use super::value_objects::TradePlanStatus;
use crate::domain::shared::DomainError;

/// Validates trade plan status transitions.
pub struct TradePlanStateMachine;

impl TradePlanStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: TradePlanStatus, to: TradePlanStatus) -> bool {
        matches!(
            (from, to),
            (TradePlanStatus::AwaitingEntry, TradePlanStatus::PositionOpen)
                | (TradePlanStatus::AwaitingEntry, TradePlanStatus::Cancelled)
                | (TradePlanStatus::AwaitingEntry, TradePlanStatus::Error)
                | (TradePlanStatus::PositionOpen, TradePlanStatus::PositionClosed)
                | (TradePlanStatus::PositionOpen, TradePlanStatus::Error)
        )
    }

    /// Validate a state transition.
    pub fn validate_transition(
        from: TradePlanStatus,
        to: TradePlanStatus,
    ) -> Result<(), DomainError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                entity: "TradePlan".to_string(),
                from: from.to_string(),
                to: to.to_string(),
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(from: TradePlanStatus, to: TradePlanStatus) -> String {
        match (from, to) {
            (_, TradePlanStatus::Cancelled) if !from.is_terminal() => {
                "only plans awaiting entry can be cancelled".to_string()
            }
            _ if from.is_terminal() => format!("plan is already {from}"),
            _ => format!("cannot move from {from} to {to}"),
        }
    }
}
