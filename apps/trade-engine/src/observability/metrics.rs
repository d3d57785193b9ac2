//! Prometheus metrics for the trade engine.
//!
//! Covers bar-close detection, execution function signals and faults, risk
//! reservations, order submissions and plan transitions.
//!
//! # Example
//!
//! ```ignore
//! use trade_engine::observability::{init_metrics, MetricsConfig};
//!
//! let config = MetricsConfig::default();
//! init_metrics(&config)?;
//!
//! record_order_submission("entry", "filled", 0.015);
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for latency and drift measurements (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            // 1ms to 30s: bar-close drift sits well under a second, fills
            // can take the whole fill timeout
            latency_buckets: vec![
                0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Create a metrics configuration with a custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP listener that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %config.listen_addr, "Prometheus metrics exporter started");

    Ok(())
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

// ============================================================================
// Bar-Close Metrics
// ============================================================================

/// Record a published bar-close event and its drift from the true boundary.
pub fn record_bar_close_event(timeframe: &str, drift_seconds: f64) {
    counter!("bar_close_events_total", "timeframe" => timeframe.to_string()).increment(1);
    histogram!("bar_close_drift_seconds", "timeframe" => timeframe.to_string())
        .record(drift_seconds);
}

/// Record a boundary whose event was suppressed.
///
/// # Arguments
///
/// * `timeframe` - Bar size (e.g., "15min")
/// * `reason` - `"missing_bar"`, `"invalid_bar"`, `"superseded"` or `"feed_error"`
pub fn record_bar_close_suppressed(timeframe: &str, reason: &str) {
    counter!(
        "bar_close_suppressed_total",
        "timeframe" => timeframe.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

// ============================================================================
// Execution Function Metrics
// ============================================================================

/// Record a signal produced by an execution function.
pub fn record_signal(function: &str, action: &str) {
    counter!(
        "signals_total",
        "function" => function.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

/// Record an execution function that failed or returned an invalid signal.
pub fn record_function_fault(function: &str) {
    counter!("function_faults_total", "function" => function.to_string()).increment(1);
}

// ============================================================================
// Risk Metrics
// ============================================================================

/// Record a reservation attempt.
///
/// # Arguments
///
/// * `outcome` - `"granted"`, `"rejected"` or `"released"`
pub fn record_reservation(outcome: &str) {
    counter!("risk_reservations_total", "outcome" => outcome.to_string()).increment(1);
}

/// Update the portfolio risk gauge (percent of account value).
pub fn update_portfolio_risk_percent(percent: f64) {
    gauge!("portfolio_risk_percent").set(percent);
}

// ============================================================================
// Order Metrics
// ============================================================================

/// Record an order submission.
///
/// # Arguments
///
/// * `kind` - `"entry"`, `"exit"`, `"protective"` or `"cancel"`
/// * `outcome` - `"filled"`, `"accepted"`, `"rejected"` or `"timeout"`
/// * `latency_seconds` - Time from submit to result in seconds
pub fn record_order_submission(kind: &str, outcome: &str, latency_seconds: f64) {
    counter!(
        "order_submissions_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!("order_latency_seconds", "kind" => kind.to_string()).record(latency_seconds);
}

/// Circuit breaker state constants.
pub mod circuit_breaker_state {
    /// Circuit is closed (healthy).
    pub const CLOSED: f64 = 0.0;
    /// Circuit is open (failing).
    pub const OPEN: f64 = 1.0;
    /// Circuit is half-open (testing).
    pub const HALF_OPEN: f64 = 2.0;
}

/// Update the order circuit breaker state gauge.
pub fn record_circuit_breaker_state(state: f64) {
    gauge!("order_circuit_breaker_state").set(state);
}

// ============================================================================
// Lifecycle Metrics
// ============================================================================

/// Record a plan status transition.
pub fn record_plan_transition(to: &str) {
    counter!("plan_transitions_total", "to" => to.to_string()).increment(1);
}

// ============================================================================
// Tests
// ============================================================================
