//! Error taxonomy for the trade engine.
//!
//! Every failure the engine reports outward maps to one [`ErrorCode`] with a
//! stable reason string and an HTTP status.
//!
//! | Code | HTTP | Meaning |
//! |------|------|---------|
//! | `INVALID_RISK_INPUT` | 400 | Sizing inputs unusable, rejected before any state change |
//! | `PORTFOLIO_RISK_EXCEEDED` | 409 | Reservation denied, plan unchanged |
//! | `DATA_QUALITY` | 422 | Stale, missing or invalid bar, evaluation skipped |
//! | `ORDER_FAULT` | 502 | Order rejected or fill timed out, plan moved to `error` |
//! | `FUNCTION_FAULT` | 422 | Execution function failed, treated as no signal |
//! | `REGISTRY_CORRUPTED` | 500 | Shared risk ledger inconsistent, fatal |
//! | `PLAN_NOT_FOUND` | 404 | Unknown plan id |
//! | `INVALID_PLAN_STATE` | 409 | Command not allowed in the plan's status |
//! | `INVALID_PLAN` | 400 | Plan or function spec failed validation |
//! | `INVALID_REQUEST` | 400 | Malformed API input |
//! | `INTERNAL_ERROR` | 500 | Anything else |

use std::collections::HashMap;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::application::ports::OrderPlacementError;
use crate::application::services::OrchestratorError;
use crate::domain::execution_functions::FunctionError;
use crate::domain::risk_management::RiskError;

/// Error codes for the trade engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad sizing parameters.
    InvalidRiskInput,
    /// Reservation would breach the portfolio ceiling.
    PortfolioRiskExceeded,
    /// Stale, missing or invalid market data.
    DataQuality,
    /// Order submission or fill failure.
    OrderFault,
    /// Execution function failure.
    FunctionFault,
    /// Shared risk ledger is inconsistent.
    RegistryCorrupted,
    /// Unknown plan.
    PlanNotFound,
    /// Command not valid in the plan's status.
    InvalidPlanState,
    /// Plan input failed validation.
    InvalidPlan,
    /// Malformed API input.
    InvalidRequest,
    /// Unexpected failure.
    InternalError,
}

impl ErrorCode {
    /// Stable machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRiskInput => "INVALID_RISK_INPUT",
            Self::PortfolioRiskExceeded => "PORTFOLIO_RISK_EXCEEDED",
            Self::DataQuality => "DATA_QUALITY",
            Self::OrderFault => "ORDER_FAULT",
            Self::FunctionFault => "FUNCTION_FAULT",
            Self::RegistryCorrupted => "REGISTRY_CORRUPTED",
            Self::PlanNotFound => "PLAN_NOT_FOUND",
            Self::InvalidPlanState => "INVALID_PLAN_STATE",
            Self::InvalidPlan => "INVALID_PLAN",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for API responses.
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidRiskInput | Self::InvalidPlan | Self::InvalidRequest => {
                StatusCode::BAD_REQUEST
            }
            Self::PortfolioRiskExceeded | Self::InvalidPlanState => StatusCode::CONFLICT,
            Self::DataQuality | Self::FunctionFault => StatusCode::UNPROCESSABLE_ENTITY,
            Self::OrderFault => StatusCode::BAD_GATEWAY,
            Self::PlanNotFound => StatusCode::NOT_FOUND,
            Self::RegistryCorrupted | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An engine error with a code and key/value context.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{}] {message}", .code.reason())]
pub struct EngineError {
    code: ErrorCode,
    message: String,
    context: Vec<(String, String)>,
}

impl EngineError {
    /// Create a new engine error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context pairs.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Convert to an HTTP error body.
    #[must_use]
    pub fn to_http_response(&self) -> HttpErrorResponse {
        HttpErrorResponse {
            code: self.code.reason().to_string(),
            message: self.message.clone(),
            details: self.context.iter().cloned().collect(),
        }
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    /// Unknown plan.
    #[must_use]
    pub fn plan_not_found(plan_id: &str) -> Self {
        Self::new(ErrorCode::PlanNotFound, format!("Plan {plan_id} not found"))
            .with_context("plan_id", plan_id)
    }

    /// Invalid plan input.
    #[must_use]
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPlan, message)
    }

    /// Malformed API input.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// HTTP error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    /// Error code string.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Additional details.
    pub details: HashMap<String, String>,
}

impl From<RiskError> for EngineError {
    fn from(error: RiskError) -> Self {
        let code = match &error {
            RiskError::InvalidRiskInput { .. } | RiskError::DuplicateReservation { .. } => {
                ErrorCode::InvalidRiskInput
            }
            RiskError::PortfolioRiskExceeded { .. } => ErrorCode::PortfolioRiskExceeded,
            RiskError::RegistryCorrupted { .. } => ErrorCode::RegistryCorrupted,
        };
        let engine = Self::new(code, error.to_string());
        match error {
            RiskError::PortfolioRiskExceeded {
                current_percent,
                attempted_percent,
                limit_percent,
                ..
            } => engine
                .with_context("current_percent", current_percent.to_string())
                .with_context("attempted_percent", attempted_percent.to_string())
                .with_context("limit_percent", limit_percent.to_string()),
            RiskError::DuplicateReservation { position_id } => {
                engine.with_context("position_id", position_id.to_string())
            }
            _ => engine,
        }
    }
}

impl From<FunctionError> for EngineError {
    fn from(error: FunctionError) -> Self {
        let code = if error.is_data_quality() {
            ErrorCode::DataQuality
        } else {
            ErrorCode::FunctionFault
        };
        Self::new(code, error.to_string())
    }
}

impl From<OrderPlacementError> for EngineError {
    fn from(error: OrderPlacementError) -> Self {
        Self::new(ErrorCode::OrderFault, error.to_string())
    }
}

impl From<OrchestratorError> for EngineError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::PlanNotFound { plan_id } => Self::plan_not_found(plan_id.as_str()),
            OrchestratorError::InvalidPlanState {
                ref plan_id,
                status,
                ..
            } => Self::new(ErrorCode::InvalidPlanState, error.to_string())
                .with_context("plan_id", plan_id.as_str())
                .with_context("status", status.as_str()),
            OrchestratorError::DuplicatePlan { ref plan_id } => {
                Self::invalid_plan(error.to_string()).with_context("plan_id", plan_id.as_str())
            }
            OrchestratorError::InvalidFunction {
                ref plan_id, role, ..
            } => Self::invalid_plan(error.to_string())
                .with_context("plan_id", plan_id.as_str())
                .with_context("role", role.to_string()),
            OrchestratorError::Risk(risk) => risk.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;
    use crate::domain::shared::{Money, PlanId};
    use crate::domain::trade_plan::TradePlanStatus;

    #[test_case(ErrorCode::InvalidRiskInput, StatusCode::BAD_REQUEST)]
    #[test_case(ErrorCode::PortfolioRiskExceeded, StatusCode::CONFLICT)]
    #[test_case(ErrorCode::DataQuality, StatusCode::UNPROCESSABLE_ENTITY)]
    #[test_case(ErrorCode::OrderFault, StatusCode::BAD_GATEWAY)]
    #[test_case(ErrorCode::PlanNotFound, StatusCode::NOT_FOUND)]
    #[test_case(ErrorCode::RegistryCorrupted, StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_http_status_mapping(code: ErrorCode, status: StatusCode) {
        assert_eq!(code.http_status(), status);
    }

    #[test]
    fn test_reason_matches_serde_name() {
        let json = serde_json::to_string(&ErrorCode::PortfolioRiskExceeded).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorCode::PortfolioRiskExceeded.reason()));
    }

    #[test]
    fn test_engine_error_context() {
        let error = EngineError::new(ErrorCode::OrderFault, "entry rejected")
            .with_context("plan_id", "AAPL_BREAKOUT")
            .with_context("kind", "entry");

        assert_eq!(error.code(), ErrorCode::OrderFault);
        assert_eq!(error.context().len(), 2);
        assert_eq!(error.to_string(), "[ORDER_FAULT] entry rejected");

        let body = error.to_http_response();
        assert_eq!(body.code, "ORDER_FAULT");
        assert_eq!(body.details.get("kind").map(String::as_str), Some("entry"));
    }

    #[test]
    fn test_risk_exceeded_carries_percentages() {
        let error: EngineError = RiskError::PortfolioRiskExceeded {
            current_total: Money::new(dec!(850)),
            attempted_total: Money::new(dec!(1150)),
            current_percent: dec!(8.5),
            attempted_percent: dec!(11.5),
            limit_percent: dec!(10),
        }
        .into();

        assert_eq!(error.code(), ErrorCode::PortfolioRiskExceeded);
        assert!(
            error
                .context()
                .contains(&("attempted_percent".to_string(), "11.5".to_string()))
        );
    }

    #[test]
    fn test_function_error_classification() {
        let data: EngineError = FunctionError::InsufficientData {
            function: "close_above",
            required: 2,
            available: 0,
        }
        .into();
        assert_eq!(data.code(), ErrorCode::DataQuality);

        let fault: EngineError = FunctionError::InvalidSignal {
            function: "close_above",
            message: "confidence NaN".to_string(),
        }
        .into();
        assert_eq!(fault.code(), ErrorCode::FunctionFault);
    }

    #[test]
    fn test_invalid_state_from_orchestrator() {
        let error: EngineError = OrchestratorError::InvalidPlanState {
            plan_id: PlanId::new("P1"),
            status: TradePlanStatus::PositionOpen,
            action: "cancel",
        }
        .into();
        assert_eq!(error.code(), ErrorCode::InvalidPlanState);
        assert_eq!(error.code().http_status(), StatusCode::CONFLICT);
    }
}
