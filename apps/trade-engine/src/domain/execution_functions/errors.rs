//! Execution function errors.

use thiserror::Error;

/// Errors raised while building or evaluating an execution function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    /// A required parameter is absent.
    #[error("{function}: missing required parameter '{parameter}'")]
    MissingParameter {
        /// Function name.
        function: &'static str,
        /// Parameter name.
        parameter: String,
    },

    /// A parameter the function does not understand.
    #[error("{function}: unknown parameter '{parameter}'")]
    UnknownParameter {
        /// Function name.
        function: &'static str,
        /// Parameter name.
        parameter: String,
    },

    /// A parameter has the wrong type or is out of range.
    #[error("{function}: invalid parameter '{parameter}': {message}")]
    InvalidParameter {
        /// Function name.
        function: &'static str,
        /// Parameter name.
        parameter: String,
        /// What is wrong.
        message: String,
    },

    /// The function cannot be used in this slot of a plan.
    #[error("{function} cannot be used as an {role} function")]
    UnsupportedRole {
        /// Function name.
        function: &'static str,
        /// Slot name.
        role: String,
    },

    /// Not enough prior bars to evaluate.
    #[error("{function}: needs {required} prior bars, got {available}")]
    InsufficientData {
        /// Function name.
        function: &'static str,
        /// Bars required.
        required: usize,
        /// Bars available.
        available: usize,
    },

    /// A bar inside the evaluation window never arrived.
    #[error("{function}: no bar closing at {close_time}")]
    MissingBar {
        /// Function name.
        function: &'static str,
        /// Close time of the absent bar.
        close_time: String,
    },

    /// A bar in the context failed validation.
    #[error("{function}: invalid bar at {close_time}: {reason}")]
    InvalidBar {
        /// Function name.
        function: &'static str,
        /// Bar close time.
        close_time: String,
        /// Validation failure.
        reason: String,
    },

    /// The function produced a signal that violates the signal contract.
    #[error("{function}: invalid signal: {message}")]
    InvalidSignal {
        /// Function name.
        function: &'static str,
        /// What is wrong.
        message: String,
    },
}

impl FunctionError {
    /// Whether the failure stems from missing or bad market data rather than
    /// from the function itself.
    #[must_use]
    pub const fn is_data_quality(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::MissingBar { .. } | Self::InvalidBar { .. }
        )
    }
}
