//! Application Ports (Hexagonal Architecture)
//!
//! Interfaces the core consumes. Infrastructure provides the adapters.

mod bar_feed_port;
mod notification_port;
mod order_placement_port;
mod state_persistence_port;

pub use bar_feed_port::{BarFeedError, BarFeedPort};
pub use notification_port::{NoOpNotifier, NotificationError, NotificationPort};
pub use order_placement_port::{FillResult, OrderPlacementError, OrderPlacementPort};
pub use state_persistence_port::{
    EngineSnapshot, InMemoryStatePersistence, PersistenceError, StatePersistencePort,
};
