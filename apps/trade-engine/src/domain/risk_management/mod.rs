//! Risk Management Bounded Context
//!
//! Deterministic position sizing and the shared portfolio risk registry.
//!
//! The registry is the only state in the engine that many plans mutate
//! concurrently. It exposes nothing but atomic `reserve` / `release` /
//! snapshot operations; the reservation map itself never leaves the lock.

mod errors;
mod registry;
mod sizer;

pub use errors::RiskError;
pub use registry::{PortfolioRiskRegistry, Reservation, RiskSnapshot};
pub use sizer::{PositionSize, PositionSizer};
