//! Execution signal value object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::FunctionError;

/// What a function recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    /// Do nothing.
    None,
    /// Open the position.
    Enter,
    /// Close the position.
    Exit,
}

impl SignalAction {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }
}

/// Output of one evaluation. Purely descriptive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSignal {
    /// Recommended action.
    pub action: SignalAction,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable explanation.
    pub reasoning: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ExecutionSignal {
    /// A no-action signal.
    #[must_use]
    pub fn none(reasoning: impl Into<String>) -> Self {
        Self::with_action(SignalAction::None, 0.0, reasoning)
    }

    /// A signal with the given action.
    #[must_use]
    pub fn with_action(action: SignalAction, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            confidence,
            reasoning: reasoning.into(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the signal asks for action.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.action != SignalAction::None
    }

    /// Check the signal contract.
    pub fn validate(&self, function: &'static str) -> Result<(), FunctionError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(FunctionError::InvalidSignal {
                function,
                message: format!("confidence {} outside [0, 1]", self.confidence),
            });
        }
        if self.reasoning.trim().is_empty() {
            return Err(FunctionError::InvalidSignal {
                function,
                message: "reasoning is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_not_actionable() {
        let signal = ExecutionSignal::none("below threshold");
        assert!(!signal.is_actionable());
        assert!(signal.validate("close_above").is_ok());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let signal = ExecutionSignal::with_action(SignalAction::Enter, 1.2, "too sure");
        assert!(signal.validate("close_above").is_err());
        let signal = ExecutionSignal::with_action(SignalAction::Enter, f64::NAN, "nan");
        assert!(signal.validate("close_above").is_err());
    }
}
