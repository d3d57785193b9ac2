//! Paper-trading order gateway.
//!
//! Fills market orders immediately at the latest stored close for the
//! symbol. Protective orders rest until cancelled.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::ports::{FillResult, OrderPlacementError, OrderPlacementPort};
use crate::domain::shared::{OrderId, Symbol, Timestamp};
use crate::domain::trade_plan::{Position, ProtectiveOrderIds, TradePlan};
use crate::infrastructure::market_data::InMemoryBarStore;

/// Kind of simulated order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedOrderKind {
    /// Market entry.
    Entry,
    /// Market exit.
    Exit,
    /// Resting stop-loss.
    StopLoss,
    /// Resting take-profit.
    TakeProfit,
}

/// An order the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedOrder {
    /// Order id.
    pub order_id: OrderId,
    /// Symbol.
    pub symbol: Symbol,
    /// Kind.
    pub kind: SimulatedOrderKind,
    /// Shares.
    pub quantity: u64,
    /// Fill price for market orders, trigger price for resting ones.
    pub price: Decimal,
    /// Acceptance time.
    pub submitted_at: Timestamp,
}

/// In-process order gateway for paper mode.
#[derive(Debug)]
pub struct SimulatedOrderGateway {
    bars: Arc<InMemoryBarStore>,
    orders: Mutex<Vec<SimulatedOrder>>,
    resting: Mutex<HashSet<OrderId>>,
    reject_next: Mutex<Option<String>>,
}

impl SimulatedOrderGateway {
    /// Create a gateway pricing fills from `bars`.
    #[must_use]
    pub fn new(bars: Arc<InMemoryBarStore>) -> Self {
        Self {
            bars,
            orders: Mutex::new(Vec::new()),
            resting: Mutex::new(HashSet::new()),
            reject_next: Mutex::new(None),
        }
    }

    /// Reject the next submission with `reason`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        *self.reject_next.lock() = Some(reason.into());
    }

    /// Every order accepted so far, in submission order.
    #[must_use]
    pub fn orders(&self) -> Vec<SimulatedOrder> {
        self.orders.lock().clone()
    }

    /// Ids of protective orders still resting.
    #[must_use]
    pub fn resting_orders(&self) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self.resting.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    fn check_rejection(&self) -> Result<(), OrderPlacementError> {
        match self.reject_next.lock().take() {
            Some(reason) => Err(OrderPlacementError::Rejected { reason }),
            None => Ok(()),
        }
    }

    fn accept(
        &self,
        symbol: &Symbol,
        kind: SimulatedOrderKind,
        quantity: u64,
        price: Decimal,
    ) -> SimulatedOrder {
        let order = SimulatedOrder {
            order_id: OrderId::generate(),
            symbol: symbol.clone(),
            kind,
            quantity,
            price,
            submitted_at: Timestamp::now(),
        };
        self.orders.lock().push(order.clone());
        order
    }

    fn fill(order: SimulatedOrder) -> FillResult {
        FillResult {
            order_id: order.order_id,
            filled_quantity: order.quantity,
            average_price: order.price,
            filled_at: order.submitted_at,
        }
    }
}

#[async_trait]
impl OrderPlacementPort for SimulatedOrderGateway {
    async fn submit_entry(
        &self,
        plan: &TradePlan,
        shares: u64,
    ) -> Result<FillResult, OrderPlacementError> {
        self.check_rejection()?;
        if shares == 0 {
            return Err(OrderPlacementError::Rejected {
                reason: "quantity must be positive".to_string(),
            });
        }

        let price = self
            .bars
            .latest_close(plan.symbol())
            .unwrap_or_else(|| plan.entry_level());
        let order = self.accept(plan.symbol(), SimulatedOrderKind::Entry, shares, price);
        tracing::debug!(
            plan_id = %plan.id(),
            order_id = %order.order_id,
            shares,
            %price,
            "Simulated entry filled"
        );
        Ok(Self::fill(order))
    }

    async fn submit_protective(
        &self,
        position: &Position,
        stop_price: Decimal,
        target_price: Decimal,
    ) -> Result<ProtectiveOrderIds, OrderPlacementError> {
        self.check_rejection()?;

        let stop = self.accept(
            &position.symbol,
            SimulatedOrderKind::StopLoss,
            position.quantity,
            stop_price,
        );
        let target = self.accept(
            &position.symbol,
            SimulatedOrderKind::TakeProfit,
            position.quantity,
            target_price,
        );

        let mut resting = self.resting.lock();
        resting.insert(stop.order_id.clone());
        resting.insert(target.order_id.clone());

        Ok(ProtectiveOrderIds {
            stop_loss: stop.order_id,
            take_profit: target.order_id,
        })
    }

    async fn cancel(&self, order_ids: &[OrderId]) -> Result<(), OrderPlacementError> {
        let mut resting = self.resting.lock();
        if let Some(unknown) = order_ids.iter().find(|id| !resting.contains(*id)) {
            return Err(OrderPlacementError::NotFound {
                order_id: unknown.clone(),
            });
        }
        for id in order_ids {
            resting.remove(id);
        }
        Ok(())
    }

    async fn submit_exit(&self, position: &Position) -> Result<FillResult, OrderPlacementError> {
        self.check_rejection()?;

        let price = self
            .bars
            .latest_close(&position.symbol)
            .unwrap_or(position.last_price);
        let order = self.accept(
            &position.symbol,
            SimulatedOrderKind::Exit,
            position.quantity,
            price,
        );
        tracing::debug!(
            plan_id = %position.plan_id,
            order_id = %order.order_id,
            quantity = position.quantity,
            %price,
            "Simulated exit filled"
        );
        Ok(Self::fill(order))
    }
}
