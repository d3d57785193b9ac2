//! Open position entity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::TradeDirection;
use crate::domain::shared::{Money, OrderId, PlanId, PositionId, Symbol, Timestamp};

/// Resting stop-loss and take-profit orders protecting a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectiveOrderIds {
    /// Stop-loss order.
    pub stop_loss: OrderId,
    /// Take-profit order.
    pub take_profit: OrderId,
}

impl ProtectiveOrderIds {
    /// Both ids, stop first.
    #[must_use]
    pub fn all(&self) -> Vec<OrderId> {
        vec![self.stop_loss.clone(), self.take_profit.clone()]
    }
}

/// A position opened by a confirmed entry fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Position identifier; also the key of its risk reservation.
    pub id: PositionId,
    /// Owning plan (back-reference only).
    pub plan_id: PlanId,
    /// Traded symbol.
    pub symbol: Symbol,
    /// Long or short.
    pub direction: TradeDirection,
    /// Actual average fill price.
    pub entry_price: Decimal,
    /// Actual filled quantity.
    pub quantity: u64,
    /// Fill time.
    pub entry_time: Timestamp,
    /// Protective orders, once placed.
    pub protective_orders: Option<ProtectiveOrderIds>,
    /// Latest price the position was marked at.
    pub last_price: Decimal,
    /// Running profit and loss at `last_price`.
    pub unrealized_pnl: Money,
    /// Best close seen by a trailing exit, if one is tracking the position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<Decimal>,
}

impl Position {
    /// Open a position from a fill.
    #[must_use]
    pub fn open(
        id: PositionId,
        plan_id: PlanId,
        symbol: Symbol,
        direction: TradeDirection,
        entry_price: Decimal,
        quantity: u64,
        entry_time: Timestamp,
    ) -> Self {
        Self {
            id,
            plan_id,
            symbol,
            direction,
            entry_price,
            quantity,
            entry_time,
            protective_orders: None,
            last_price: entry_price,
            unrealized_pnl: Money::ZERO,
            watermark: None,
        }
    }

    /// Profit and loss if the whole position were closed at `price`.
    #[must_use]
    pub fn pnl_at(&self, price: Decimal) -> Money {
        Money::new((price - self.entry_price) * Decimal::from(self.quantity) * self.direction.sign())
    }

    /// Update the running P&L.
    pub fn mark_to_market(&mut self, price: Decimal) {
        self.last_price = price;
        self.unrealized_pnl = self.pnl_at(price);
    }

    /// Record a trailing watermark. It only moves in the position's favour;
    /// returns whether it changed.
    pub fn record_watermark(&mut self, mark: Decimal) -> bool {
        let next = match (self.watermark, self.direction) {
            (None, _) => mark,
            (Some(current), TradeDirection::Long) => current.max(mark),
            (Some(current), TradeDirection::Short) => current.min(mark),
        };
        let changed = self.watermark != Some(next);
        self.watermark = Some(next);
        changed
    }

    /// Ids of protective orders that may still be resting.
    #[must_use]
    pub fn protective_order_ids(&self) -> Vec<OrderId> {
        self.protective_orders
            .as_ref()
            .map(ProtectiveOrderIds::all)
            .unwrap_or_default()
    }
}
