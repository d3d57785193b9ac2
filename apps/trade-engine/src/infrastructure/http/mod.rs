//! HTTP/REST API adapter.
//!
//! Inbound adapter exposing the orchestrator's queries and commands, plus a
//! bar ingest endpoint that feeds the in-memory bar store.

mod controller;
mod request;
mod response;

pub use controller::{AppState, create_router};
pub use request::*;
pub use response::*;
