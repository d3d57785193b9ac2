//! Trade Plan Bounded Context
//!
//! A trade plan is a declarative intent to trade one symbol: entry level,
//! protective stop and target, a risk category, and the execution functions
//! that decide when to enter and when to leave. The aggregate owns its
//! lifecycle status; positions are tracked alongside it by plan id.

mod aggregate;
mod events;
mod position;
mod state_machine;
mod value_objects;

pub use aggregate::{NewTradePlan, TradePlan};
pub use events::{LifecycleEvent, LifecycleEventKind};
pub use position::{Position, ProtectiveOrderIds};
pub use state_machine::TradePlanStateMachine;
pub use value_objects::{
    ExecutionFunctionSpec, FunctionRole, FunctionType, RiskCategory, TradeDirection,
    TradePlanStatus,
};
