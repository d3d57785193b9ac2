//! Order Circuit Breaker
//!
//! Counts consecutive order failures. Once the threshold is reached the
//! breaker opens and new entries are refused until `reset_timeout` has
//! passed. In half-open the next outcome decides: a success closes the
//! breaker, a failure reopens it.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::observability::{circuit_breaker_state, record_circuit_breaker_state};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Closed - normal operation.
    Closed,
    /// Open - refusing entries.
    Open,
    /// Half-open - trial calls allowed.
    HalfOpen,
}

impl CircuitBreakerState {
    const fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => circuit_breaker_state::CLOSED,
            Self::Open => circuit_breaker_state::OPEN,
            Self::HalfOpen => circuit_breaker_state::HALF_OPEN,
        }
    }
}

/// Breaker settings.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for order placement failures.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitBreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a new call may proceed. An open breaker whose timeout has
    /// elapsed moves to half-open.
    pub fn is_call_permitted(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => true,
            CircuitBreakerState::Open => {
                if let Some(opened_at) = inner.opened_at
                    && opened_at.elapsed() >= self.config.reset_timeout
                {
                    inner.state = CircuitBreakerState::HalfOpen;
                    record_circuit_breaker_state(inner.state.gauge_value());
                    tracing::info!("Order circuit breaker half-open, allowing trial order");
                    return true;
                }
                false
            }
        }
    }

    /// Record a successful order.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        if inner.state != CircuitBreakerState::Closed {
            inner.state = CircuitBreakerState::Closed;
            record_circuit_breaker_state(inner.state.gauge_value());
            tracing::info!("Order circuit breaker closed");
        }
    }

    /// Record a failed order.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trips = inner.state == CircuitBreakerState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trips {
            if inner.state != CircuitBreakerState::Open {
                tracing::warn!(
                    failure_count = inner.consecutive_failures,
                    reset_timeout_secs = self.config.reset_timeout.as_secs(),
                    "Order circuit breaker opened"
                );
            }
            inner.state = CircuitBreakerState::Open;
            inner.opened_at = Some(Instant::now());
            record_circuit_breaker_state(inner.state.gauge_value());
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().state
    }

    /// Consecutive failures so far.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_secs(60),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let cb = breaker(3);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        assert!(cb.is_call_permitted());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Open);
        assert!(!cb.is_call_permitted());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let cb = breaker(2);
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_after_timeout_then_closes_on_success() {
        let cb = breaker(1);
        cb.record_failure();
        assert!(!cb.is_call_permitted());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cb.is_call_permitted());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.is_call_permitted());
        assert_eq!(cb.state(), CircuitBreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        assert!(cb.is_call_permitted());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens() {
        let cb = breaker(1);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cb.is_call_permitted());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitBreakerState::Open);
        assert!(!cb.is_call_permitted());
    }
}
