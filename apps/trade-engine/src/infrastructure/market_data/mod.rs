//! Market data adapters.

mod bar_store;

pub use bar_store::InMemoryBarStore;
