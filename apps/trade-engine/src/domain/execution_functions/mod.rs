//! Execution Functions Bounded Context
//!
//! Decision rules evaluated on bar close. Each function reads an immutable
//! [`EvaluationContext`] and returns an [`ExecutionSignal`]; the set of
//! functions is closed ([`ExecutionFunctionKind`]) so every dispatch is an
//! exhaustive match.
//!
//! Parameters are validated when a function is built from its spec, never at
//! evaluation time.

mod context;
mod errors;
mod kind;
mod params;
mod signal;
mod threshold;
mod trailing_stop;

pub use context::{AccountSnapshot, EvaluationContext, PlanParameters, PositionState};
pub use errors::FunctionError;
pub use kind::{ExecutionFunction, ExecutionFunctionKind};
pub use signal::{ExecutionSignal, SignalAction};
pub use threshold::{CloseThreshold, Comparison};
pub use trailing_stop::TrailingStop;
