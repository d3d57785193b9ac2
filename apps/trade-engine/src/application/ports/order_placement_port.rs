//! Order Placement Port (Driven Port)
//!
//! Narrow interface to the broker connectivity layer. Rejections and
//! timeouts are per-plan faults; the core never retries on its own.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{OrderId, Timestamp};
use crate::domain::trade_plan::{Position, ProtectiveOrderIds, TradePlan};

/// A confirmed fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillResult {
    /// Broker order id.
    pub order_id: OrderId,
    /// Shares filled.
    pub filled_quantity: u64,
    /// Average fill price.
    pub average_price: Decimal,
    /// Fill time.
    pub filled_at: Timestamp,
}

/// Order placement errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrderPlacementError {
    /// The broker refused the order.
    #[error("order rejected: {reason}")]
    Rejected {
        /// Broker reason.
        reason: String,
    },

    /// The gateway could not be reached.
    #[error("order gateway unavailable: {message}")]
    Unavailable {
        /// Transport detail.
        message: String,
    },

    /// An order to cancel does not exist.
    #[error("order not found: {order_id}")]
    NotFound {
        /// Order id.
        order_id: OrderId,
    },
}

/// Port for submitting and cancelling orders.
#[async_trait]
pub trait OrderPlacementPort: Send + Sync {
    /// Submit the entry order for `plan` and wait for its fill.
    async fn submit_entry(
        &self,
        plan: &TradePlan,
        shares: u64,
    ) -> Result<FillResult, OrderPlacementError>;

    /// Place stop-loss and take-profit orders protecting `position`.
    async fn submit_protective(
        &self,
        position: &Position,
        stop_price: Decimal,
        target_price: Decimal,
    ) -> Result<ProtectiveOrderIds, OrderPlacementError>;

    /// Cancel resting orders.
    async fn cancel(&self, order_ids: &[OrderId]) -> Result<(), OrderPlacementError>;

    /// Submit the exit order for `position` and wait for its fill.
    async fn submit_exit(&self, position: &Position) -> Result<FillResult, OrderPlacementError>;
}
