//! Environment configuration for trading mode.

use serde::{Deserialize, Serialize};

/// Environment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Trading mode: `PAPER` or `LIVE`.
    #[serde(default = "default_environment_mode")]
    pub mode: String,
}

impl EnvironmentConfig {
    /// Whether orders go to the simulated gateway.
    #[must_use]
    pub fn is_paper(&self) -> bool {
        self.mode.eq_ignore_ascii_case("PAPER")
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            mode: default_environment_mode(),
        }
    }
}

fn default_environment_mode() -> String {
    "PAPER".to_string()
}
