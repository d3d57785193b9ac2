//! Evaluation context handed to execution functions.

use rust_decimal::Decimal;

use super::errors::FunctionError;
use crate::domain::market_data::{Bar, Timeframe};
use crate::domain::shared::{Money, Symbol, Timestamp};
use crate::domain::trade_plan::{Position, TradeDirection, TradePlan};

/// The owning plan's levels, copied in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanParameters {
    /// Intended entry.
    pub entry_level: Decimal,
    /// Protective stop.
    pub stop_loss: Decimal,
    /// Target.
    pub take_profit: Decimal,
    /// Trade direction.
    pub direction: TradeDirection,
}

impl From<&TradePlan> for PlanParameters {
    fn from(plan: &TradePlan) -> Self {
        Self {
            entry_level: plan.entry_level(),
            stop_loss: plan.stop_loss(),
            take_profit: plan.take_profit(),
            direction: plan.direction(),
        }
    }
}

/// The open position, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionState {
    /// Fill price.
    pub entry_price: Decimal,
    /// Filled shares.
    pub quantity: u64,
    /// Long or short.
    pub direction: TradeDirection,
    /// Fill time.
    pub entry_time: Timestamp,
    /// Best close recorded for the position so far, carried across restarts.
    pub watermark: Option<Decimal>,
}

impl From<&Position> for PositionState {
    fn from(position: &Position) -> Self {
        Self {
            entry_price: position.entry_price,
            quantity: position.quantity,
            direction: position.direction,
            entry_time: position.entry_time,
            watermark: position.watermark,
        }
    }
}

/// Account figures at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Account value.
    pub account_value: Money,
    /// Reserved risk as a percentage of account value.
    pub portfolio_risk_percent: Decimal,
}

/// Everything a function may look at. Built fresh for every evaluation and
/// only ever handed out by shared reference.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    symbol: Symbol,
    timeframe: Timeframe,
    current_bar: Bar,
    window: Vec<Bar>,
    plan: PlanParameters,
    position: Option<PositionState>,
    account: AccountSnapshot,
}

impl EvaluationContext {
    /// Build a context. `window` holds prior bars, oldest first.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        timeframe: Timeframe,
        current_bar: Bar,
        window: Vec<Bar>,
        plan: PlanParameters,
        position: Option<PositionState>,
        account: AccountSnapshot,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            current_bar,
            window,
            plan,
            position,
            account,
        }
    }

    /// Symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Timeframe.
    #[must_use]
    pub const fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// The bar that just closed.
    #[must_use]
    pub const fn current_bar(&self) -> &Bar {
        &self.current_bar
    }

    /// Prior bars, oldest first.
    #[must_use]
    pub fn window(&self) -> &[Bar] {
        &self.window
    }

    /// Plan levels.
    #[must_use]
    pub const fn plan(&self) -> &PlanParameters {
        &self.plan
    }

    /// Open position, if any.
    #[must_use]
    pub const fn position(&self) -> Option<&PositionState> {
        self.position.as_ref()
    }

    /// Account figures.
    #[must_use]
    pub const fn account(&self) -> &AccountSnapshot {
        &self.account
    }

    /// The last `n` closes ending with the current bar, oldest first.
    ///
    /// The bars used must sit exactly one bar length apart. A short window
    /// is `InsufficientData`; a hole in it is `MissingBar`.
    pub fn recent_closes(
        &self,
        function: &'static str,
        n: usize,
    ) -> Result<Vec<Decimal>, FunctionError> {
        let prior = n.saturating_sub(1);
        if self.window.len() < prior {
            return Err(FunctionError::InsufficientData {
                function,
                required: prior,
                available: self.window.len(),
            });
        }
        let used = &self.window[self.window.len() - prior..];

        let step = self.timeframe.duration();
        let mut expected = self.current_bar.close_time.as_datetime();
        for bar in used.iter().rev() {
            expected = expected - step;
            if bar.close_time.as_datetime() != expected {
                return Err(FunctionError::MissingBar {
                    function,
                    close_time: Timestamp::new(expected).to_string(),
                });
            }
        }

        Ok(used
            .iter()
            .map(|bar| bar.close)
            .chain(std::iter::once(self.current_bar.close))
            .collect())
    }
}
