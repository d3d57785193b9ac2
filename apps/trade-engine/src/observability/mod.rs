//! Observability module for metrics.
//!
//! Prometheus export of scheduler, execution function, risk and order
//! metrics. Tracing setup lives in `crate::telemetry`.

mod metrics;

pub use metrics::{
    MetricsConfig, MetricsError, circuit_breaker_state, init_metrics,
    record_bar_close_event, record_bar_close_suppressed, record_circuit_breaker_state,
    record_function_fault, record_order_submission, record_plan_transition,
    record_reservation, record_signal, update_portfolio_risk_percent,
};
