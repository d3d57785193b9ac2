//! HTTP request DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market_data::Bar;
use crate::domain::shared::Timestamp;

/// Query string for plan listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPlansQuery {
    /// `active` (default) or `all`.
    #[serde(default)]
    pub status: Option<String>,
}

/// Request to cancel a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelPlanRequest {
    /// Operator-supplied reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// A completed bar pushed by the data collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestBarRequest {
    /// Open.
    pub open: Decimal,
    /// High.
    pub high: Decimal,
    /// Low.
    pub low: Decimal,
    /// Close.
    pub close: Decimal,
    /// Volume.
    pub volume: u64,
    /// Bar close time; must sit on a boundary of the path timeframe.
    pub close_time: Timestamp,
}

impl From<IngestBarRequest> for Bar {
    fn from(request: IngestBarRequest) -> Self {
        Self {
            open: request.open,
            high: request.high,
            low: request.low,
            close: request.close,
            volume: request.volume,
            close_time: request.close_time,
        }
    }
}
