//! Lifecycle events reported to the notification collaborator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::TradePlanStatus;
use crate::domain::shared::{Money, PlanId, PositionId, Symbol, Timestamp};

/// What happened to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEventKind {
    /// The plan moved to a new status.
    StatusChanged {
        /// Previous status.
        from: TradePlanStatus,
        /// New status.
        to: TradePlanStatus,
        /// Why.
        reason: String,
    },
    /// The entry order filled.
    EntryFilled {
        /// New position.
        position_id: PositionId,
        /// Filled shares.
        quantity: u64,
        /// Average fill price.
        price: Decimal,
        /// Reserved dollar risk.
        dollar_risk: Money,
    },
    /// The exit order filled.
    ExitFilled {
        /// Closed position.
        position_id: PositionId,
        /// Filled shares.
        quantity: u64,
        /// Average fill price.
        price: Decimal,
        /// Realized profit and loss.
        realized_pnl: Money,
    },
    /// The portfolio risk ceiling denied a reservation.
    ReservationRejected {
        /// Why.
        reason: String,
    },
    /// An entry signal was not acted on.
    EntrySkipped {
        /// Why.
        reason: String,
    },
    /// Protective orders could not be placed after entry.
    ProtectiveOrdersFailed {
        /// Why.
        reason: String,
    },
}

/// A lifecycle event for one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Plan the event concerns.
    pub plan_id: PlanId,
    /// Plan symbol.
    pub symbol: Symbol,
    /// When it happened.
    pub occurred_at: Timestamp,
    /// Event payload.
    #[serde(flatten)]
    pub kind: LifecycleEventKind,
}

impl LifecycleEvent {
    /// Create an event stamped now.
    #[must_use]
    pub fn new(plan_id: PlanId, symbol: Symbol, kind: LifecycleEventKind) -> Self {
        Self {
            plan_id,
            symbol,
            occurred_at: Timestamp::now(),
            kind,
        }
    }

    /// Short machine-readable event name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self.kind {
            LifecycleEventKind::StatusChanged { .. } => "status_changed",
            LifecycleEventKind::EntryFilled { .. } => "entry_filled",
            LifecycleEventKind::ExitFilled { .. } => "exit_filled",
            LifecycleEventKind::ReservationRejected { .. } => "reservation_rejected",
            LifecycleEventKind::EntrySkipped { .. } => "entry_skipped",
            LifecycleEventKind::ProtectiveOrdersFailed { .. } => "protective_orders_failed",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> String {
        let head = format!("[{} {}]", self.plan_id, self.symbol);
        match &self.kind {
            LifecycleEventKind::StatusChanged { from, to, reason } => {
                format!("{head} {from} -> {to}: {reason}")
            }
            LifecycleEventKind::EntryFilled {
                quantity,
                price,
                dollar_risk,
                ..
            } => format!("{head} entry filled: {quantity} @ {price} (risk {dollar_risk})"),
            LifecycleEventKind::ExitFilled {
                quantity,
                price,
                realized_pnl,
                ..
            } => format!("{head} exit filled: {quantity} @ {price} (P&L {realized_pnl})"),
            LifecycleEventKind::ReservationRejected { reason } => {
                format!("{head} risk reservation rejected: {reason}")
            }
            LifecycleEventKind::EntrySkipped { reason } => {
                format!("{head} entry skipped: {reason}")
            }
            LifecycleEventKind::ProtectiveOrdersFailed { reason } => {
                format!("{head} protective orders failed: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn message_is_readable() {
        let event = LifecycleEvent::new(
            PlanId::new("AAPL_1"),
            Symbol::new("AAPL"),
            LifecycleEventKind::EntryFilled {
                position_id: PositionId::new("p"),
                quantity: 80,
                price: dec!(180.55),
                dollar_risk: Money::new(dec!(200)),
            },
        );
        assert_eq!(event.event_type(), "entry_filled");
        assert_eq!(
            event.message(),
            "[AAPL_1 AAPL] entry filled: 80 @ 180.55 (risk $200.00)"
        );
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = LifecycleEvent::new(
            PlanId::new("AAPL_1"),
            Symbol::new("AAPL"),
            LifecycleEventKind::EntrySkipped {
                reason: "zero shares".to_string(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "entry_skipped");
        assert_eq!(json["plan_id"], "AAPL_1");
    }
}
