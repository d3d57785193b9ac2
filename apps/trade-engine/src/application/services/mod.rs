//! Application Services
//!
//! - `BarCloseScheduler`: per-pair boundary detection with grace-window polling
//! - `TradeLifecycleOrchestrator`: per-plan state machine driver
//! - `NotificationDispatcher`: non-blocking lifecycle event delivery
//! - `CircuitBreaker`: trips after consecutive order failures

mod bar_close_scheduler;
mod circuit_breaker;
mod clock;
mod notification_dispatcher;
mod orchestrator;

pub use bar_close_scheduler::{
    BarCloseEvent, BarCloseScheduler, DataQualityIssue, DataQualityWarning, SchedulerConfig,
    SchedulerEvent, TimingStats,
};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
pub use clock::{Clock, SystemClock, TokioClock};
pub use notification_dispatcher::NotificationDispatcher;
pub use orchestrator::{
    OrchestratorConfig, OrchestratorError, RestoreSummary, TradeLifecycleOrchestrator,
};
