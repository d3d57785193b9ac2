//! Configuration module for the trade engine.
//!
//! Loads YAML configuration with environment variable interpolation and
//! validates it before anything is wired.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trade_engine::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! println!("HTTP port: {}", config.http.port);
//! ```

mod environment;
mod observability;
mod orders;
mod persistence;
mod risk;
mod scheduler;
mod server;

use std::net::SocketAddr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use environment::EnvironmentConfig;
pub use observability::ObservabilityConfig;
pub use orders::{CircuitBreakerSettings, OrdersConfig};
pub use persistence::PersistenceConfig;
pub use risk::RiskConfig;
pub use scheduler::SchedulerSettings;
pub use server::HttpConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Trading mode.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Bar-close scheduler.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Account value and portfolio ceiling.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Order timeouts and circuit breaker.
    #[serde(default)]
    pub orders: OrdersConfig,
    /// State and plan files.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// HTTP API.
    #[serde(default)]
    pub http: HttpConfig,
    /// Metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match cap.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(value)) if !value.is_empty() => value,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` naming the first offending field.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |message: &str| Err(ConfigError::ValidationError(message.to_string()));

    let valid_modes = ["PAPER", "LIVE"];
    if !valid_modes.contains(&config.environment.mode.to_ascii_uppercase().as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "environment.mode must be one of: {valid_modes:?}"
        )));
    }

    if config.risk.account_value <= Decimal::ZERO {
        return invalid("risk.account_value must be positive");
    }
    let limit = config.risk.max_portfolio_risk_percent;
    if limit <= Decimal::ZERO || limit > Decimal::ONE_HUNDRED {
        return invalid("risk.max_portfolio_risk_percent must be in (0, 100]");
    }

    let scheduler = &config.scheduler;
    if scheduler.grace_window_ms == 0 {
        return invalid("scheduler.grace_window_ms must be positive");
    }
    if scheduler.poll_interval_ms == 0 || scheduler.poll_interval_ms > scheduler.grace_window_ms {
        return invalid("scheduler.poll_interval_ms must be positive and at most grace_window_ms");
    }
    if scheduler.event_buffer == 0 {
        return invalid("scheduler.event_buffer must be positive");
    }
    if scheduler.daily_close().is_none() {
        return invalid("scheduler.daily_close_utc must be HH:MM");
    }

    let orders = &config.orders;
    if orders.fill_timeout_secs == 0 {
        return invalid("orders.fill_timeout_secs must be positive");
    }
    if orders.notification_buffer == 0 {
        return invalid("orders.notification_buffer must be positive");
    }
    if orders.circuit_breaker.failure_threshold == 0 {
        return invalid("orders.circuit_breaker.failure_threshold must be positive");
    }

    if config.persistence.state_path.trim().is_empty() {
        return invalid("persistence.state_path must not be empty");
    }

    if config.observability.metrics_enabled {
        let Ok(metrics_addr) = config.observability.metrics_addr.parse::<SocketAddr>() else {
            return invalid("observability.metrics_addr must be a socket address");
        };
        if metrics_addr.port() == config.http.port {
            return invalid("http.port and observability.metrics_addr port must be different");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    const MINIMAL: &str = r"
risk:
  account_value: 10000
";

    #[test]
    fn test_default_sections() {
        let config = Config::default();

        assert!(config.environment.is_paper());
        assert_eq!(config.scheduler.grace_window_ms, 5000);
        assert_eq!(config.scheduler.daily_close_utc, "21:00");
        assert_eq!(config.risk.max_portfolio_risk_percent, dec!(10));
        assert_eq!(config.orders.fill_timeout_secs, 30);
        assert_eq!(config.orders.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.persistence.state_path, "data/engine_state.json");
        assert_eq!(config.http.port, 8080);
        assert!(config.observability.metrics_enabled);
    }

    #[test]
    fn test_load_minimal_config() {
        let config = match load_config_from_string(MINIMAL) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.risk.account_value, dec!(10000));
        assert_eq!(config.orders.circuit_breaker.reset_timeout_secs, 60);

        let scheduler = config.scheduler.to_scheduler_config();
        assert_eq!(scheduler.grace_window.as_millis(), 5000);
        assert_eq!(scheduler.daily_close.to_string(), "21:00:00");
    }

    #[test]
    fn test_bundled_config_is_valid() {
        let config = load_config_from_string(include_str!("../../config.yaml")).unwrap();
        assert_eq!(config.scheduler.daily_close_utc, "21:00");
        assert_eq!(config.risk.max_portfolio_risk_percent, dec!(10));
        assert!(config.persistence.plans_path.ends_with("plans.yaml"));
    }

    #[test]
    fn test_orchestrator_config_conversion() {
        let yaml = r"
risk:
  account_value: 25000
orders:
  fill_timeout_secs: 10
  circuit_breaker:
    failure_threshold: 3
    reset_timeout_secs: 120
";
        let config = load_config_from_string(yaml).unwrap();
        let orchestrator = config.orders.to_orchestrator_config();
        assert_eq!(orchestrator.fill_timeout.as_secs(), 10);
        assert_eq!(orchestrator.breaker.failure_threshold, 3);
        assert_eq!(orchestrator.breaker.reset_timeout.as_secs(), 120);
    }

    #[test]
    fn test_missing_account_value_fails() {
        let Err(err) = load_config_from_string("http:\n  port: 8081\n") else {
            panic!("expected error for missing account value");
        };
        assert!(err.to_string().contains("account_value"));
    }

    #[test]
    fn test_validation_invalid_risk_ceiling() {
        let yaml = r"
risk:
  account_value: 10000
  max_portfolio_risk_percent: 150
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for ceiling above 100");
        };
        assert!(err.to_string().contains("max_portfolio_risk_percent"));
    }

    #[test]
    fn test_validation_invalid_environment_mode() {
        let yaml = r"
environment:
  mode: BACKTEST
risk:
  account_value: 10000
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for invalid mode");
        };
        assert!(err.to_string().contains("environment.mode"));
    }

    #[test]
    fn test_validation_bad_daily_close() {
        let yaml = r#"
risk:
  account_value: 10000
scheduler:
  daily_close_utc: "4pm"
"#;
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for malformed close time");
        };
        assert!(err.to_string().contains("daily_close_utc"));
    }

    #[test]
    fn test_validation_port_clash() {
        let yaml = r"
risk:
  account_value: 10000
http:
  port: 9090
";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "mode: ${TRADE_ENGINE_CONFIG_TEST_NONEXISTENT_VAR:-PAPER}";
        assert_eq!(interpolate_env_vars(input), "mode: PAPER");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "api_key: ${TRADE_ENGINE_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "api_key: ");
    }

    #[test]
    fn test_load_missing_file() {
        let Err(err) = load_config(Some("/nonexistent/trade-engine.yaml")) else {
            panic!("expected read error");
        };
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
