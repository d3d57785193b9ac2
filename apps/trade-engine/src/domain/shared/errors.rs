//! Domain errors for the trade engine.

use std::fmt;

/// Domain-level errors that can occur in business logic.
///
/// These errors are independent of infrastructure concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid state transition attempted.
    InvalidStateTransition {
        /// Entity type (e.g., "TradePlan").
        entity: String,
        /// Current state.
        from: String,
        /// Attempted state.
        to: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid value for a field.
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },

    /// Aggregate invariant violated.
    InvariantViolation {
        /// Aggregate type.
        aggregate: String,
        /// Invariant that was violated.
        invariant: String,
    },
}

impl DomainError {
    /// Shorthand for an [`DomainError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStateTransition {
                entity,
                from,
                to,
                reason,
            } => write!(
                f,
                "Invalid state transition for {entity}: {from} -> {to} ({reason})"
            ),
            Self::InvalidValue { field, message } => {
                write!(f, "Invalid value for {field}: {message}")
            }
            Self::InvariantViolation {
                aggregate,
                invariant,
            } => write!(f, "Invariant violated in {aggregate}: {invariant}"),
        }
    }
}

impl std::error::Error for DomainError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = DomainError::InvalidStateTransition {
            entity: "TradePlan".to_string(),
            from: "position_open".to_string(),
            to: "cancelled".to_string(),
            reason: "only awaiting plans can be cancelled".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition for TradePlan: position_open -> cancelled (only awaiting plans can be cancelled)"
        );

        let err = DomainError::invalid_value("stop_loss", "must differ from entry");
        assert_eq!(err.to_string(), "Invalid value for stop_loss: must differ from entry");
    }
}
