// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trade Engine - Rust Core Library
//!
//! Bar-close driven execution core: detects completed bars per
//! (symbol, timeframe), evaluates each trade plan's entry or exit function,
//! sizes positions under a portfolio-wide risk ceiling and drives every plan
//! through entry, protective orders and exit.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic, no I/O
//!   - `trade_plan`: TradePlan aggregate, status state machine, positions, lifecycle events
//!   - `execution_functions`: close_above, close_below, trailing_stop
//!   - `risk_management`: Position sizing, portfolio risk registry
//!   - `market_data`: Bars and timeframes
//!
//! - **Application**: Orchestration
//!   - `ports`: `OrderPlacementPort`, `NotificationPort`, `StatePersistencePort`, `BarFeedPort`
//!   - `services`: `BarCloseScheduler`, `TradeLifecycleOrchestrator`, `CircuitBreaker`
//!
//! - **Infrastructure**: Adapters
//!   - `broker`: Simulated order gateway
//!   - `market_data`: In-memory bar store
//!   - `persistence`: JSON state file
//!   - `http`: REST API
//!   - `container`: Dependency wiring

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Engine error taxonomy.
pub mod error;

/// Prometheus metrics.
pub mod observability;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::market_data::{Bar, Timeframe};
pub use domain::risk_management::{PortfolioRiskRegistry, PositionSizer, RiskError};
pub use domain::shared::{Money, OrderId, PlanId, PositionId, Symbol, Timestamp};
pub use domain::trade_plan::{Position, TradePlan, TradePlanStatus};

// Application re-exports
pub use application::ports::{
    BarFeedPort, NotificationPort, OrderPlacementPort, StatePersistencePort,
};
pub use application::services::{BarCloseScheduler, TradeLifecycleOrchestrator};

// Infrastructure re-exports
pub use infrastructure::container::{Container, ContainerError};
pub use infrastructure::http::{AppState, create_router};

pub use error::{EngineError, ErrorCode};
