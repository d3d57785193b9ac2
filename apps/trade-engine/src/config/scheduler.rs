//! Bar-close scheduler configuration.

use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::application::services::SchedulerConfig;

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// How long to wait for a bar after its boundary (milliseconds).
    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,
    /// Feed polling interval inside the grace window (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Detection drift counted as late (milliseconds).
    #[serde(default = "default_accuracy_ms")]
    pub accuracy_ms: u64,
    /// Daily session close as `HH:MM` in UTC.
    #[serde(default = "default_daily_close_utc")]
    pub daily_close_utc: String,
    /// Scheduler event channel capacity.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            grace_window_ms: default_grace_window_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            accuracy_ms: default_accuracy_ms(),
            daily_close_utc: default_daily_close_utc(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl SchedulerSettings {
    /// Parsed daily close, if well-formed.
    #[must_use]
    pub fn daily_close(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.daily_close_utc.trim(), "%H:%M").ok()
    }

    /// Runtime scheduler configuration. Call after validation; a malformed
    /// close time falls back to the default.
    #[must_use]
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            grace_window: Duration::from_millis(self.grace_window_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            accuracy: Duration::from_millis(self.accuracy_ms),
            daily_close: self.daily_close().unwrap_or(defaults.daily_close),
            event_buffer: self.event_buffer,
        }
    }
}

const fn default_grace_window_ms() -> u64 {
    5_000
}

const fn default_poll_interval_ms() -> u64 {
    250
}

const fn default_accuracy_ms() -> u64 {
    1_000
}

fn default_daily_close_utc() -> String {
    "21:00".to_string()
}

const fn default_event_buffer() -> usize {
    256
}
