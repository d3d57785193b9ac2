//! Order handling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::{CircuitBreakerConfig, OrchestratorConfig};

/// Order settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersConfig {
    /// Bound on each order call (seconds).
    #[serde(default = "default_fill_timeout_secs")]
    pub fill_timeout_secs: u64,
    /// Lifecycle notification queue capacity.
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
    /// Order circuit breaker.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Duration in open state (seconds).
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            fill_timeout_secs: default_fill_timeout_secs(),
            notification_buffer: default_notification_buffer(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

impl OrdersConfig {
    /// Runtime orchestrator configuration.
    #[must_use]
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            fill_timeout: Duration::from_secs(self.fill_timeout_secs),
            breaker: CircuitBreakerConfig {
                failure_threshold: self.circuit_breaker.failure_threshold,
                reset_timeout: Duration::from_secs(self.circuit_breaker.reset_timeout_secs),
            },
            notification_buffer: self.notification_buffer,
        }
    }
}

const fn default_fill_timeout_secs() -> u64 {
    30
}

const fn default_notification_buffer() -> usize {
    256
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_reset_timeout_secs() -> u64 {
    60
}
