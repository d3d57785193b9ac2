//! Domain Layer
//!
//! Core business logic for trade execution. Nothing in here performs I/O.
//!
//! # Bounded Contexts
//!
//! - `market_data`: Bars and timeframe boundary arithmetic
//! - `trade_plan`: Trade plan aggregate, lifecycle status, positions
//! - `execution_functions`: Entry/exit decision rules evaluated on bar close
//! - `risk_management`: Position sizing and the portfolio risk registry
//!
//! # Shared Kernel
//!
//! The `shared` module contains value objects used across contexts.

pub mod execution_functions;
pub mod market_data;
pub mod risk_management;
pub mod shared;
pub mod trade_plan;
