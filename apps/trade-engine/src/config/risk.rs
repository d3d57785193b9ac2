//! Portfolio risk configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Risk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Account value positions are sized against. Required.
    #[serde(default)]
    pub account_value: Decimal,
    /// Ceiling on reserved risk as a percentage of account value.
    #[serde(default = "default_max_portfolio_risk_percent")]
    pub max_portfolio_risk_percent: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_value: Decimal::ZERO,
            max_portfolio_risk_percent: default_max_portfolio_risk_percent(),
        }
    }
}

const fn default_max_portfolio_risk_percent() -> Decimal {
    Decimal::TEN
}
