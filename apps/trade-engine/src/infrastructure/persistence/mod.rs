//! Persistence Adapters
//!
//! File-backed implementation of `StatePersistencePort`. The in-memory
//! variant used by tests lives next to the port.

mod json_file;

pub use json_file::JsonFileStateStore;
