//! `close_above` / `close_below`
//!
//! Fires when the bar closes strictly beyond a fixed threshold. Gap bars are
//! not treated specially: the first close beyond the threshold fires even if
//! price jumped over it.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::context::EvaluationContext;
use super::errors::FunctionError;
use super::kind::ExecutionFunction;
use super::params::ParamReader;
use super::signal::{ExecutionSignal, SignalAction};
use crate::domain::trade_plan::FunctionRole;

const PARAMS: &[&str] = &["threshold", "min_volume", "confirmation_bars", "action"];
const MAX_CONFIRMATION_BARS: u64 = 10;
const BASE_CONFIDENCE: f64 = 0.6;
const MAX_DISTANCE_BOOST: f64 = 0.3;
const VOLUME_BOOST: f64 = 0.1;

/// Side of the threshold that triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `close > threshold`.
    Above,
    /// `close < threshold`.
    Below,
}

impl Comparison {
    fn holds(self, close: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Above => close > threshold,
            Self::Below => close < threshold,
        }
    }

    const fn word(self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

/// Threshold crossing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseThreshold {
    comparison: Comparison,
    threshold: Decimal,
    min_volume: Option<u64>,
    confirmation_bars: usize,
    action: SignalAction,
}

impl CloseThreshold {
    /// Build from a parameter map.
    ///
    /// Parameters: `threshold` (required, > 0), `min_volume` (optional),
    /// `confirmation_bars` (1..=10, default 1), `action` (`enter` | `exit`,
    /// must match `role` when given).
    pub fn from_params(
        comparison: Comparison,
        params: &serde_json::Map<String, serde_json::Value>,
        role: FunctionRole,
    ) -> Result<Self, FunctionError> {
        let name = Self::name_for(comparison);
        let reader = ParamReader::new(name, params, PARAMS)?;

        let threshold = reader.required_decimal("threshold")?;
        if threshold <= Decimal::ZERO {
            return Err(reader.invalid("threshold", "must be positive"));
        }

        let min_volume = reader.optional_u64("min_volume")?;

        let confirmation_bars = reader.optional_u64("confirmation_bars")?.unwrap_or(1);
        if !(1..=MAX_CONFIRMATION_BARS).contains(&confirmation_bars) {
            return Err(reader.invalid(
                "confirmation_bars",
                format!("must be between 1 and {MAX_CONFIRMATION_BARS}"),
            ));
        }

        let role_action = match role {
            FunctionRole::Entry => SignalAction::Enter,
            FunctionRole::Exit => SignalAction::Exit,
        };
        let action = match reader.optional_str("action")? {
            None => role_action,
            Some(text) => {
                let requested = match text.trim().to_ascii_lowercase().as_str() {
                    "enter" => SignalAction::Enter,
                    "exit" => SignalAction::Exit,
                    other => {
                        return Err(reader.invalid("action", format!("unknown action '{other}'")));
                    }
                };
                if requested != role_action {
                    return Err(reader.invalid(
                        "action",
                        format!("'{text}' does not match the {role} slot"),
                    ));
                }
                requested
            }
        };

        Ok(Self {
            comparison,
            threshold,
            min_volume,
            confirmation_bars: confirmation_bars as usize,
            action,
        })
    }

    const fn name_for(comparison: Comparison) -> &'static str {
        match comparison {
            Comparison::Above => "close_above",
            Comparison::Below => "close_below",
        }
    }

    /// Configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> Decimal {
        self.threshold
    }

    fn confidence(&self, close: Decimal, volume: u64) -> f64 {
        let distance = ((close - self.threshold).abs() / self.threshold)
            .to_f64()
            .unwrap_or(0.0);
        let mut confidence = BASE_CONFIDENCE + (distance * 10.0).min(MAX_DISTANCE_BOOST);
        if let Some(min) = self.min_volume
            && min > 0
            && volume >= min.saturating_mul(2)
        {
            confidence += VOLUME_BOOST;
        }
        confidence.min(1.0)
    }
}

impl ExecutionFunction for CloseThreshold {
    fn name(&self) -> &'static str {
        Self::name_for(self.comparison)
    }

    fn required_lookback(&self) -> usize {
        self.confirmation_bars - 1
    }

    fn evaluate(&mut self, ctx: &EvaluationContext) -> Result<ExecutionSignal, FunctionError> {
        let closes = ctx.recent_closes(self.name(), self.confirmation_bars)?;

        let bar = ctx.current_bar();
        let word = self.comparison.word();

        if let Some(min) = self.min_volume
            && bar.volume < min
        {
            return Ok(ExecutionSignal::none(format!(
                "volume {} below minimum {min}",
                bar.volume
            )));
        }

        if !closes
            .iter()
            .all(|close| self.comparison.holds(*close, self.threshold))
        {
            return Ok(ExecutionSignal::none(format!(
                "close {} not {word} threshold {} for {} bar(s)",
                bar.close, self.threshold, self.confirmation_bars
            )));
        }

        let confidence = self.confidence(bar.close, bar.volume);
        Ok(ExecutionSignal::with_action(
            self.action,
            confidence,
            format!(
                "close {} {word} threshold {} for {} bar(s)",
                bar.close, self.threshold, self.confirmation_bars
            ),
        )
        .with_metadata("threshold", self.threshold.to_string())
        .with_metadata("close", bar.close.to_string())
        .with_metadata("volume", bar.volume))
    }
}
