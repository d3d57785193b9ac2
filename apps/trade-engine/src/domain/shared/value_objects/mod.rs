//! Shared value objects.

mod identifiers;
mod money;
mod symbol;
mod timestamp;

pub use identifiers::{OrderId, PlanId, PositionId};
pub use money::Money;
pub use symbol::Symbol;
pub use timestamp::Timestamp;
