//! Application Layer
//!
//! Orchestrates the domain against external collaborators.
//!
//! - `ports`: Interfaces for order placement, notifications, state
//!   persistence and completed-bar lookup
//! - `services`: Bar-close scheduler, trade lifecycle orchestrator,
//!   notification dispatcher and order circuit breaker

pub mod ports;
pub mod services;
