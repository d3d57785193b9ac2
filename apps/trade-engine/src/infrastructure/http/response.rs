//! HTTP response DTOs.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::services::TimingStats;
use crate::domain::market_data::Timeframe;
use crate::domain::risk_management::RiskSnapshot;
use crate::domain::shared::{Symbol, Timestamp};
use crate::domain::trade_plan::{Position, TradePlan};
use crate::error::EngineError;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `halted` after a fatal registry fault.
    pub status: String,
    /// Application version.
    pub version: String,
    /// Trading mode.
    pub mode: String,
}

/// A plan with its open position, if any.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    /// Plan state.
    #[serde(flatten)]
    pub plan: TradePlan,
    /// Open position.
    pub position: Option<Position>,
}

/// Plan listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListPlansResponse {
    /// Plans, by id.
    pub plans: Vec<PlanResponse>,
    /// Number of plans returned.
    pub count: usize,
}

/// A pair the scheduler is watching.
#[derive(Debug, Clone, Serialize)]
pub struct WatchedPairResponse {
    /// Symbol.
    pub symbol: Symbol,
    /// Timeframe.
    pub timeframe: Timeframe,
    /// Plans subscribed to the pair.
    pub subscribers: usize,
}

/// Portfolio risk and scheduler health.
#[derive(Debug, Clone, Serialize)]
pub struct RiskResponse {
    /// Registry totals.
    #[serde(flatten)]
    pub risk: RiskSnapshot,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Pairs under watch.
    pub watched_pairs: Vec<WatchedPairResponse>,
    /// Bar-close detection drift.
    pub timing: TimingStats,
}

/// Acknowledgement of an ingested bar.
#[derive(Debug, Clone, Serialize)]
pub struct IngestBarResponse {
    /// Symbol.
    pub symbol: Symbol,
    /// Timeframe.
    pub timeframe: Timeframe,
    /// Stored bar's close time.
    pub close_time: Timestamp,
    /// Bars now held for the series.
    pub stored_bars: usize,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        (self.code().http_status(), Json(self.to_http_response())).into_response()
    }
}
