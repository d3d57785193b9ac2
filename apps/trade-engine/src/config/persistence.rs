//! State persistence configuration.

use serde::{Deserialize, Serialize};

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Engine snapshot file.
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// Trade plans to activate at startup.
    #[serde(default = "default_plans_path")]
    pub plans_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            plans_path: default_plans_path(),
        }
    }
}

fn default_state_path() -> String {
    "data/engine_state.json".to_string()
}

fn default_plans_path() -> String {
    "plans.yaml".to_string()
}
