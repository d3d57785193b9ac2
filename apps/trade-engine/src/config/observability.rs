//! Observability configuration.

use serde::{Deserialize, Serialize};

/// Metrics exporter settings. Tracing is configured from the environment
/// (`RUST_LOG`, `OTEL_*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Prometheus listener address.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    /// Whether to start the Prometheus exporter.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
            metrics_enabled: true,
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

const fn default_true() -> bool {
    true
}
