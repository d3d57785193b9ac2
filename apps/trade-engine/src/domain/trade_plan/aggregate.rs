//! Trade Plan Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state_machine::TradePlanStateMachine;
use super::value_objects::{
    ExecutionFunctionSpec, FunctionRole, RiskCategory, TradeDirection, TradePlanStatus,
};
use crate::domain::shared::{DomainError, Money, PlanId, Symbol, Timestamp};

/// Validated input for creating a trade plan.
#[derive(Debug, Clone)]
pub struct NewTradePlan {
    /// Plan identifier.
    pub id: PlanId,
    /// Instrument to trade.
    pub symbol: Symbol,
    /// Intended entry price.
    pub entry_level: Decimal,
    /// Protective stop price.
    pub stop_loss: Decimal,
    /// Profit target price.
    pub take_profit: Decimal,
    /// Risk tier used for sizing.
    pub risk_category: RiskCategory,
    /// Function deciding the entry.
    pub entry_function: ExecutionFunctionSpec,
    /// Function deciding the exit.
    pub exit_function: ExecutionFunctionSpec,
}

/// Trade Plan aggregate root.
///
/// Immutable once it reaches a terminal status. All status changes go through
/// [`TradePlanStateMachine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    id: PlanId,
    symbol: Symbol,
    entry_level: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
    risk_category: RiskCategory,
    entry_function: ExecutionFunctionSpec,
    exit_function: ExecutionFunctionSpec,
    status: TradePlanStatus,
    position_size: Option<u64>,
    dollar_risk: Option<Money>,
    status_reason: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TradePlan {
    /// Create a plan in `awaiting_entry`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidValue` if a price is non-positive, the
    /// stop equals the entry, or the levels are not ordered for the trade's
    /// direction.
    pub fn create(input: NewTradePlan) -> Result<Self, DomainError> {
        for (field, value) in [
            ("entry_level", input.entry_level),
            ("stop_loss", input.stop_loss),
            ("take_profit", input.take_profit),
        ] {
            if value <= Decimal::ZERO {
                return Err(DomainError::invalid_value(field, "must be positive"));
            }
        }

        if input.entry_level == input.stop_loss {
            return Err(DomainError::invalid_value(
                "stop_loss",
                "must differ from entry_level",
            ));
        }

        let ordered = match TradeDirection::from_levels(input.entry_level, input.take_profit) {
            TradeDirection::Long => input.stop_loss < input.entry_level,
            TradeDirection::Short => {
                input.take_profit < input.entry_level && input.entry_level < input.stop_loss
            }
        };
        if !ordered {
            return Err(DomainError::invalid_value(
                "stop_loss",
                format!(
                    "levels out of order: stop={} entry={} target={}",
                    input.stop_loss, input.entry_level, input.take_profit
                ),
            ));
        }

        let now = Timestamp::now();
        Ok(Self {
            id: input.id,
            symbol: input.symbol,
            entry_level: input.entry_level,
            stop_loss: input.stop_loss,
            take_profit: input.take_profit,
            risk_category: input.risk_category,
            entry_function: input.entry_function,
            exit_function: input.exit_function,
            status: TradePlanStatus::AwaitingEntry,
            position_size: None,
            dollar_risk: None,
            status_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Plan identifier.
    #[must_use]
    pub const fn id(&self) -> &PlanId {
        &self.id
    }

    /// Traded symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Intended entry price.
    #[must_use]
    pub const fn entry_level(&self) -> Decimal {
        self.entry_level
    }

    /// Protective stop price.
    #[must_use]
    pub const fn stop_loss(&self) -> Decimal {
        self.stop_loss
    }

    /// Profit target.
    #[must_use]
    pub const fn take_profit(&self) -> Decimal {
        self.take_profit
    }

    /// Risk tier.
    #[must_use]
    pub const fn risk_category(&self) -> RiskCategory {
        self.risk_category
    }

    /// Entry function spec.
    #[must_use]
    pub const fn entry_function(&self) -> &ExecutionFunctionSpec {
        &self.entry_function
    }

    /// Exit function spec.
    #[must_use]
    pub const fn exit_function(&self) -> &ExecutionFunctionSpec {
        &self.exit_function
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TradePlanStatus {
        self.status
    }

    /// Filled share count once the position is open, or the sized estimate before.
    #[must_use]
    pub const fn position_size(&self) -> Option<u64> {
        self.position_size
    }

    /// Dollar risk computed at sizing time.
    #[must_use]
    pub const fn dollar_risk(&self) -> Option<Money> {
        self.dollar_risk
    }

    /// Reason given for the latest status change.
    #[must_use]
    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Last mutation time.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Direction implied by entry and target.
    #[must_use]
    pub fn direction(&self) -> TradeDirection {
        TradeDirection::from_levels(self.entry_level, self.take_profit)
    }

    /// Whether the plan can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The function that is evaluated in the current status, if any.
    #[must_use]
    pub const fn active_function(&self) -> Option<(FunctionRole, &ExecutionFunctionSpec)> {
        match self.status {
            TradePlanStatus::AwaitingEntry => Some((FunctionRole::Entry, &self.entry_function)),
            TradePlanStatus::PositionOpen => Some((FunctionRole::Exit, &self.exit_function)),
            _ => None,
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Record the sizing decision made ahead of an entry order.
    pub fn record_sizing(&mut self, shares: u64, dollar_risk: Money) -> Result<(), DomainError> {
        self.ensure_status(TradePlanStatus::AwaitingEntry, "record sizing")?;
        self.position_size = Some(shares);
        self.dollar_risk = Some(dollar_risk);
        self.touch();
        Ok(())
    }

    /// Move to `position_open`, recording the actual filled quantity.
    pub fn mark_position_open(&mut self, filled_quantity: u64) -> Result<(), DomainError> {
        self.transition(
            TradePlanStatus::PositionOpen,
            format!("entry filled for {filled_quantity} shares"),
        )?;
        self.position_size = Some(filled_quantity);
        Ok(())
    }

    /// Move to `position_closed`.
    pub fn mark_position_closed(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TradePlanStatus::PositionClosed, reason)
    }

    /// Move to `cancelled`. Only valid before entry.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TradePlanStatus::Cancelled, reason)
    }

    /// Move to `error`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TradePlanStatus::Error, reason)
    }

    /// Stamp the function in `role` with the close time it was evaluated on.
    pub fn mark_evaluated(&mut self, role: FunctionRole, bar_close: Timestamp) {
        match role {
            FunctionRole::Entry => self.entry_function.last_evaluated = Some(bar_close),
            FunctionRole::Exit => self.exit_function.last_evaluated = Some(bar_close),
        }
        self.touch();
    }

    fn transition(
        &mut self,
        to: TradePlanStatus,
        reason: impl Into<String>,
    ) -> Result<(), DomainError> {
        TradePlanStateMachine::validate_transition(self.status, to)?;
        self.status = to;
        self.status_reason = Some(reason.into());
        self.touch();
        Ok(())
    }

    fn ensure_status(&self, expected: TradePlanStatus, action: &str) -> Result<(), DomainError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DomainError::InvariantViolation {
                aggregate: "TradePlan".to_string(),
                invariant: format!("{action} requires status {expected}, plan is {}", self.status),
            })
        }
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market_data::Timeframe;
    use crate::domain::trade_plan::FunctionType;
    use rust_decimal_macros::dec;

    fn input() -> NewTradePlan {
        NewTradePlan {
            id: PlanId::new("AAPL_BREAKOUT"),
            symbol: Symbol::new("AAPL"),
            entry_level: dec!(180.50),
            stop_loss: dec!(178.00),
            take_profit: dec!(188.00),
            risk_category: RiskCategory::Normal,
            entry_function: ExecutionFunctionSpec::new(
                FunctionType::CloseAbove,
                Timeframe::FifteenMinutes,
            )
            .with_param("threshold", 180.5),
            exit_function: ExecutionFunctionSpec::new(
                FunctionType::TrailingStop,
                Timeframe::OneHour,
            )
            .with_param("trail_percent", 1.5),
        }
    }

    #[test]
    fn creates_awaiting_entry() {
        let plan = TradePlan::create(input()).unwrap();
        assert_eq!(plan.status(), TradePlanStatus::AwaitingEntry);
        assert_eq!(plan.direction(), TradeDirection::Long);
        let (role, spec) = plan.active_function().unwrap();
        assert_eq!(role, FunctionRole::Entry);
        assert_eq!(spec.timeframe, Timeframe::FifteenMinutes);
    }

    #[test]
    fn rejects_stop_equal_to_entry() {
        let mut bad = input();
        bad.stop_loss = bad.entry_level;
        assert!(TradePlan::create(bad).is_err());
    }

    #[test]
    fn rejects_misordered_short() {
        let mut bad = input();
        bad.take_profit = dec!(170);
        bad.stop_loss = dec!(178);
        assert!(TradePlan::create(bad).is_err());

        let mut good = input();
        good.take_profit = dec!(170);
        good.stop_loss = dec!(183);
        assert_eq!(
            TradePlan::create(good).unwrap().direction(),
            TradeDirection::Short
        );
    }

    #[test]
    fn full_lifecycle_switches_active_function() {
        let mut plan = TradePlan::create(input()).unwrap();
        plan.record_sizing(80, Money::new(dec!(200))).unwrap();
        plan.mark_position_open(78).unwrap();
        assert_eq!(plan.position_size(), Some(78));
        assert_eq!(plan.active_function().unwrap().0, FunctionRole::Exit);

        plan.mark_position_closed("exit filled").unwrap();
        assert!(plan.is_terminal());
        assert!(plan.active_function().is_none());
        assert!(plan.cancel("late").is_err());
    }

    #[test]
    fn cannot_open_twice() {
        let mut plan = TradePlan::create(input()).unwrap();
        plan.mark_position_open(80).unwrap();
        assert!(plan.mark_position_open(80).is_err());
        assert!(plan.record_sizing(10, Money::ZERO).is_err());
    }

    #[test]
    fn mark_evaluated_stamps_role() {
        let mut plan = TradePlan::create(input()).unwrap();
        let at = Timestamp::parse("2024-03-01T14:45:00Z").unwrap();
        plan.mark_evaluated(FunctionRole::Entry, at);
        assert_eq!(plan.entry_function().last_evaluated, Some(at));
        assert!(plan.exit_function().last_evaluated.is_none());
    }
}
