//! Execution function trait and the closed set of built-ins.

use rust_decimal::Decimal;

use super::context::EvaluationContext;
use super::errors::FunctionError;
use super::signal::ExecutionSignal;
use super::threshold::{CloseThreshold, Comparison};
use super::trailing_stop::TrailingStop;
use crate::domain::trade_plan::{ExecutionFunctionSpec, FunctionRole, FunctionType};

/// A decision rule evaluated on bar close.
pub trait ExecutionFunction: Send {
    /// Function name, for logs and metrics.
    fn name(&self) -> &'static str;

    /// Prior bars needed in the evaluation window.
    fn required_lookback(&self) -> usize;

    /// Evaluate against a context.
    fn evaluate(&mut self, ctx: &EvaluationContext) -> Result<ExecutionSignal, FunctionError>;
}

/// All built-in execution functions.
///
/// New functions are added as variants so every dispatch stays exhaustive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFunctionKind {
    /// `close_above`.
    CloseAbove(CloseThreshold),
    /// `close_below`.
    CloseBelow(CloseThreshold),
    /// `trailing_stop`.
    TrailingStop(TrailingStop),
}

impl ExecutionFunctionKind {
    /// Build and validate a function for the given plan slot.
    ///
    /// # Errors
    ///
    /// Returns `FunctionError` for unknown, missing or out-of-range parameters
    /// and for functions that cannot serve `role`.
    pub fn from_spec(
        spec: &ExecutionFunctionSpec,
        role: FunctionRole,
    ) -> Result<Self, FunctionError> {
        match spec.function_type {
            FunctionType::CloseAbove => {
                CloseThreshold::from_params(Comparison::Above, &spec.parameters, role)
                    .map(Self::CloseAbove)
            }
            FunctionType::CloseBelow => {
                CloseThreshold::from_params(Comparison::Below, &spec.parameters, role)
                    .map(Self::CloseBelow)
            }
            FunctionType::TrailingStop => {
                if role != FunctionRole::Exit {
                    return Err(FunctionError::UnsupportedRole {
                        function: "trailing_stop",
                        role: role.to_string(),
                    });
                }
                TrailingStop::from_params(&spec.parameters).map(Self::TrailingStop)
            }
        }
    }

    /// Which built-in this is.
    #[must_use]
    pub const fn function_type(&self) -> FunctionType {
        match self {
            Self::CloseAbove(_) => FunctionType::CloseAbove,
            Self::CloseBelow(_) => FunctionType::CloseBelow,
            Self::TrailingStop(_) => FunctionType::TrailingStop,
        }
    }

    /// Running watermark of a trailing exit.
    #[must_use]
    pub const fn watermark(&self) -> Option<Decimal> {
        match self {
            Self::TrailingStop(f) => f.watermark(),
            Self::CloseAbove(_) | Self::CloseBelow(_) => None,
        }
    }

    fn inner(&mut self) -> &mut dyn ExecutionFunction {
        match self {
            Self::CloseAbove(f) | Self::CloseBelow(f) => f,
            Self::TrailingStop(f) => f,
        }
    }
}

impl ExecutionFunction for ExecutionFunctionKind {
    fn name(&self) -> &'static str {
        self.function_type().as_str()
    }

    fn required_lookback(&self) -> usize {
        match self {
            Self::CloseAbove(f) | Self::CloseBelow(f) => f.required_lookback(),
            Self::TrailingStop(f) => f.required_lookback(),
        }
    }

    /// Validates every bar in the context, runs the function, then checks the
    /// returned signal against the signal contract.
    fn evaluate(&mut self, ctx: &EvaluationContext) -> Result<ExecutionSignal, FunctionError> {
        let name = self.name();

        for bar in ctx.window().iter().chain(std::iter::once(ctx.current_bar())) {
            bar.validate().map_err(|e| FunctionError::InvalidBar {
                function: name,
                close_time: bar.close_time.to_string(),
                reason: e.to_string(),
            })?;
        }

        let signal = self.inner().evaluate(ctx)?;
        signal.validate(name)?;
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution_functions::{AccountSnapshot, PlanParameters, SignalAction};
    use crate::domain::market_data::{Bar, Timeframe};
    use crate::domain::shared::{Money, Symbol, Timestamp};
    use crate::domain::trade_plan::TradeDirection;
    use rust_decimal_macros::dec;

    fn ctx(close: rust_decimal::Decimal, volume: u64) -> EvaluationContext {
        EvaluationContext::new(
            Symbol::new("AAPL"),
            Timeframe::FifteenMinutes,
            Bar {
                open: close,
                high: close,
                low: close,
                close,
                volume,
                close_time: Timestamp::now(),
            },
            vec![],
            PlanParameters {
                entry_level: dec!(180.50),
                stop_loss: dec!(178),
                take_profit: dec!(188),
                direction: TradeDirection::Long,
            },
            None,
            AccountSnapshot {
                account_value: Money::new(dec!(10000)),
                portfolio_risk_percent: dec!(0),
            },
        )
    }

    #[test]
    fn builds_each_builtin() {
        let above = ExecutionFunctionSpec::new(FunctionType::CloseAbove, Timeframe::FifteenMinutes)
            .with_param("threshold", 180.5);
        let below = ExecutionFunctionSpec::new(FunctionType::CloseBelow, Timeframe::FifteenMinutes)
            .with_param("threshold", 178);
        let trail = ExecutionFunctionSpec::new(FunctionType::TrailingStop, Timeframe::OneHour)
            .with_param("trail_percent", 1.5);

        assert_eq!(
            ExecutionFunctionKind::from_spec(&above, FunctionRole::Entry)
                .unwrap()
                .function_type(),
            FunctionType::CloseAbove
        );
        assert_eq!(
            ExecutionFunctionKind::from_spec(&below, FunctionRole::Exit)
                .unwrap()
                .function_type(),
            FunctionType::CloseBelow
        );
        let trailing = ExecutionFunctionKind::from_spec(&trail, FunctionRole::Exit).unwrap();
        assert_eq!(trailing.required_lookback(), 20);
    }

    #[test]
    fn trailing_stop_cannot_enter() {
        let trail = ExecutionFunctionSpec::new(FunctionType::TrailingStop, Timeframe::OneHour)
            .with_param("trail_percent", 1.5);
        assert!(matches!(
            ExecutionFunctionKind::from_spec(&trail, FunctionRole::Entry),
            Err(FunctionError::UnsupportedRole { .. })
        ));
    }

    #[test]
    fn invalid_bar_is_a_data_quality_skip() {
        let spec = ExecutionFunctionSpec::new(FunctionType::CloseAbove, Timeframe::FifteenMinutes)
            .with_param("threshold", 180.5);
        let mut f = ExecutionFunctionKind::from_spec(&spec, FunctionRole::Entry).unwrap();

        let err = f.evaluate(&ctx(dec!(181), 0)).unwrap_err();
        assert!(err.is_data_quality());

        let signal = f.evaluate(&ctx(dec!(181), 100)).unwrap();
        assert_eq!(signal.action, SignalAction::Enter);
    }
}
