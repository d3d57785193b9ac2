//! Shared Kernel
//!
//! Value objects and errors shared across bounded contexts.

mod errors;
pub mod value_objects;

pub use errors::DomainError;
pub use value_objects::{Money, OrderId, PlanId, PositionId, Symbol, Timestamp};
