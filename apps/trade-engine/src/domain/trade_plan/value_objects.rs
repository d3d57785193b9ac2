//! Trade plan value objects.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::market_data::Timeframe;
use crate::domain::shared::Timestamp;

/// Lifecycle status of a trade plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradePlanStatus {
    /// Waiting for the entry function to fire.
    AwaitingEntry,
    /// Entry filled; the exit function is managing the position.
    PositionOpen,
    /// Exit filled.
    PositionClosed,
    /// Cancelled before entry.
    Cancelled,
    /// Irrecoverable fault.
    Error,
}

impl TradePlanStatus {
    /// Whether the plan will never transition again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::PositionClosed | Self::Cancelled | Self::Error)
    }

    /// Snake-case name, as used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingEntry => "awaiting_entry",
            Self::PositionOpen => "position_open",
            Self::PositionClosed => "position_closed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TradePlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    /// 1% of account value.
    Small,
    /// 2% of account value.
    Normal,
    /// 3% of account value.
    Large,
}

impl RiskCategory {
    /// Percentage of account value risked per trade.
    #[must_use]
    pub fn risk_percent(&self) -> Decimal {
        match self {
            Self::Small => Decimal::ONE,
            Self::Normal => Decimal::TWO,
            Self::Large => Decimal::from(3),
        }
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    /// Profit when price rises.
    Long,
    /// Profit when price falls.
    Short,
}

impl TradeDirection {
    /// A plan is long when its target sits above its entry.
    #[must_use]
    pub fn from_levels(entry: Decimal, take_profit: Decimal) -> Self {
        if take_profit > entry {
            Self::Long
        } else {
            Self::Short
        }
    }

    /// +1 for long, -1 for short.
    #[must_use]
    pub const fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => f.write_str("long"),
            Self::Short => f.write_str("short"),
        }
    }
}

/// Built-in execution function identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    /// Fires when a bar closes above a threshold.
    CloseAbove,
    /// Fires when a bar closes below a threshold.
    CloseBelow,
    /// Exits when price retraces from its best close by a percentage.
    TrailingStop,
}

impl FunctionType {
    /// Snake-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CloseAbove => "close_above",
            Self::CloseBelow => "close_below",
            Self::TrailingStop => "trailing_stop",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slot of a plan a function occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionRole {
    /// Decides when to open the position.
    Entry,
    /// Decides when to close it.
    Exit,
}

impl fmt::Display for FunctionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

/// Declarative description of an execution function attached to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFunctionSpec {
    /// Which built-in function to run.
    pub function_type: FunctionType,
    /// Bar size the function is evaluated on.
    pub timeframe: Timeframe,
    /// Function-specific parameters.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Close time of the last bar this function was evaluated against.
    #[serde(default)]
    pub last_evaluated: Option<Timestamp>,
}

impl ExecutionFunctionSpec {
    /// Create a spec with no parameters.
    #[must_use]
    pub fn new(function_type: FunctionType, timeframe: Timeframe) -> Self {
        Self {
            function_type,
            timeframe,
            parameters: Map::new(),
            last_evaluated: None,
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}
