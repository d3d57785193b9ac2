//! Broker Adapters
//!
//! Implementations of `OrderPlacementPort`. Only the paper gateway ships;
//! live brokerage connectivity is provided by an external service.

mod simulated;

pub use simulated::{SimulatedOrder, SimulatedOrderGateway, SimulatedOrderKind};
