//! `trailing_stop`
//!
//! Tracks the best close since entry (highest for long, lowest for short) and
//! exits when the current close retraces past it by `trail_percent`. The
//! watermark only ever moves in the position's favour.

use rust_decimal::Decimal;

use super::context::EvaluationContext;
use super::errors::FunctionError;
use super::kind::ExecutionFunction;
use super::params::ParamReader;
use super::signal::{ExecutionSignal, SignalAction};
use crate::domain::shared::Timestamp;
use crate::domain::trade_plan::TradeDirection;

const NAME: &str = "trailing_stop";
const PARAMS: &[&str] = &["trail_percent", "activation_price", "lookback_bars"];
const DEFAULT_LOOKBACK_BARS: u64 = 20;
const MAX_LOOKBACK_BARS: u64 = 500;
const EXIT_CONFIDENCE: f64 = 0.9;

/// Trailing stop rule with its running watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingStop {
    trail_percent: Decimal,
    activation_price: Option<Decimal>,
    lookback_bars: usize,
    watermark: Option<Decimal>,
    tracked_entry: Option<Timestamp>,
}

impl TrailingStop {
    /// Build from a parameter map.
    ///
    /// Parameters: `trail_percent` (required, 0 < p < 100), `activation_price`
    /// (optional, > 0), `lookback_bars` (optional, 1..=500, default 20).
    pub fn from_params(
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, FunctionError> {
        let reader = ParamReader::new(NAME, params, PARAMS)?;

        let trail_percent = reader.required_decimal("trail_percent")?;
        if trail_percent <= Decimal::ZERO || trail_percent >= Decimal::ONE_HUNDRED {
            return Err(reader.invalid("trail_percent", "must be between 0 and 100 exclusive"));
        }

        let activation_price = reader.optional_decimal("activation_price")?;
        if activation_price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(reader.invalid("activation_price", "must be positive"));
        }

        let lookback_bars = reader
            .optional_u64("lookback_bars")?
            .unwrap_or(DEFAULT_LOOKBACK_BARS);
        if !(1..=MAX_LOOKBACK_BARS).contains(&lookback_bars) {
            return Err(reader.invalid(
                "lookback_bars",
                format!("must be between 1 and {MAX_LOOKBACK_BARS}"),
            ));
        }

        Ok(Self {
            trail_percent,
            activation_price,
            lookback_bars: lookback_bars as usize,
            watermark: None,
            tracked_entry: None,
        })
    }

    /// Current watermark, if a position is being tracked.
    #[must_use]
    pub const fn watermark(&self) -> Option<Decimal> {
        self.watermark
    }

    fn ratchet(direction: TradeDirection, watermark: Decimal, close: Decimal) -> Decimal {
        match direction {
            TradeDirection::Long => watermark.max(close),
            TradeDirection::Short => watermark.min(close),
        }
    }

    fn stop_level(&self, direction: TradeDirection, watermark: Decimal) -> Decimal {
        let trail = self.trail_percent / Decimal::ONE_HUNDRED;
        match direction {
            TradeDirection::Long => watermark * (Decimal::ONE - trail),
            TradeDirection::Short => watermark * (Decimal::ONE + trail),
        }
    }
}

impl ExecutionFunction for TrailingStop {
    fn name(&self) -> &'static str {
        NAME
    }

    fn required_lookback(&self) -> usize {
        self.lookback_bars
    }

    fn evaluate(&mut self, ctx: &EvaluationContext) -> Result<ExecutionSignal, FunctionError> {
        let Some(position) = ctx.position() else {
            self.watermark = None;
            self.tracked_entry = None;
            return Ok(ExecutionSignal::none("no open position to trail"));
        };

        if self.tracked_entry != Some(position.entry_time) {
            self.watermark = position.watermark;
            self.tracked_entry = Some(position.entry_time);
        }

        let direction = position.direction;
        let close = ctx.current_bar().close;
        let watermark = ctx
            .window()
            .iter()
            .filter(|bar| bar.close_time > position.entry_time)
            .map(|bar| bar.close)
            .chain(std::iter::once(close))
            .fold(
                self.watermark.unwrap_or(position.entry_price),
                |mark, close| Self::ratchet(direction, mark, close),
            );
        self.watermark = Some(watermark);

        if let Some(activation) = self.activation_price {
            let active = match direction {
                TradeDirection::Long => watermark >= activation,
                TradeDirection::Short => watermark <= activation,
            };
            if !active {
                return Ok(ExecutionSignal::none(format!(
                    "trailing not active: watermark {watermark} has not reached {activation}"
                )));
            }
        }

        let stop = self.stop_level(direction, watermark);
        let breached = match direction {
            TradeDirection::Long => close <= stop,
            TradeDirection::Short => close >= stop,
        };

        let signal = if breached {
            ExecutionSignal::with_action(
                SignalAction::Exit,
                EXIT_CONFIDENCE,
                format!(
                    "close {close} breached trailing stop {} ({}% from {watermark})",
                    stop.round_dp(4),
                    self.trail_percent
                ),
            )
        } else {
            ExecutionSignal::none(format!(
                "close {close} holds above trailing stop {} (watermark {watermark})",
                stop.round_dp(4)
            ))
        };

        Ok(signal
            .with_metadata("watermark", watermark.to_string())
            .with_metadata("stop_level", stop.round_dp(4).to_string()))
    }
}
