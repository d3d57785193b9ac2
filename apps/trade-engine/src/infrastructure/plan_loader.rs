//! Trade plan loader.
//!
//! Reads a YAML list of plan documents and turns each into a validated
//! [`TradePlan`]. Function specs are built once here so a bad parameter
//! fails at load time instead of on the first bar close.
//!
//! ```yaml
//! - plan_id: AAPL_BREAKOUT
//!   symbol: AAPL
//!   entry_level: 180.50
//!   stop_loss: 178.00
//!   take_profit: 185.00
//!   risk_category: normal
//!   entry_function:
//!     function_type: close_above
//!     timeframe: 5min
//!     parameters: { threshold: 180.50, confirmation_bars: 2 }
//!   exit_function:
//!     function_type: trailing_stop
//!     timeframe: 5min
//!     parameters: { trail_percent: 1.5 }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::execution_functions::{ExecutionFunctionKind, FunctionError};
use crate::domain::shared::{DomainError, PlanId, Symbol};
use crate::domain::trade_plan::{
    ExecutionFunctionSpec, FunctionRole, NewTradePlan, RiskCategory, TradePlan,
};

/// Plan loading errors.
#[derive(Debug, Error)]
pub enum PlanLoadError {
    /// The plans file could not be read.
    #[error("Failed to read plans file '{path}': {source}")]
    ReadError {
        /// File path.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The document is not valid YAML for a plan list.
    #[error("Failed to parse plans YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// A plan field failed validation.
    #[error("Plan '{plan_id}' is invalid: {message}")]
    InvalidPlan {
        /// Plan id as written in the file.
        plan_id: String,
        /// What is wrong.
        message: String,
    },

    /// An execution function spec failed validation.
    #[error("Plan '{plan_id}' has an invalid {role} function: {source}")]
    InvalidFunction {
        /// Plan id.
        plan_id: String,
        /// Slot.
        role: FunctionRole,
        /// Cause.
        source: FunctionError,
    },

    /// Two plans share an id.
    #[error("Duplicate plan id '{0}'")]
    DuplicatePlan(String),
}

/// One plan as written in the plans file.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanDocument {
    /// Plan identifier (`^[A-Z0-9_]+$`).
    pub plan_id: String,
    /// Ticker (`^[A-Z]{1,10}$`).
    pub symbol: String,
    /// Entry price.
    pub entry_level: Decimal,
    /// Protective stop.
    pub stop_loss: Decimal,
    /// Profit target.
    pub take_profit: Decimal,
    /// Risk tier.
    #[serde(default = "default_risk_category")]
    pub risk_category: RiskCategory,
    /// Entry rule.
    pub entry_function: ExecutionFunctionSpec,
    /// Exit rule.
    pub exit_function: ExecutionFunctionSpec,
}

const fn default_risk_category() -> RiskCategory {
    RiskCategory::Normal
}

#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn plan_id_regex() -> &'static Regex {
    static PLAN_ID: OnceLock<Regex> = OnceLock::new();
    PLAN_ID.get_or_init(|| Regex::new(r"^[A-Z0-9_]+$").expect("plan id regex is valid"))
}

#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn symbol_regex() -> &'static Regex {
    static SYMBOL: OnceLock<Regex> = OnceLock::new();
    SYMBOL.get_or_init(|| Regex::new(r"^[A-Z]{1,10}$").expect("symbol regex is valid"))
}

/// Load plans from a YAML file. A missing file yields no plans.
///
/// # Errors
///
/// Returns a `PlanLoadError` if the file cannot be read or parsed, or if any
/// plan fails validation.
pub fn load_plans(path: impl AsRef<Path>) -> Result<Vec<TradePlan>, PlanLoadError> {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No plans file, starting with no plans");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(PlanLoadError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        }
    };
    load_plans_from_str(&contents)
}

/// Load plans from a YAML string.
///
/// # Errors
///
/// Returns a `PlanLoadError` if the YAML cannot be parsed or any plan fails
/// validation.
pub fn load_plans_from_str(yaml: &str) -> Result<Vec<TradePlan>, PlanLoadError> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let documents: Vec<PlanDocument> = serde_yaml_bw::from_str(yaml)?;

    let mut seen = HashSet::new();
    let mut plans = Vec::with_capacity(documents.len());
    for document in documents {
        if !seen.insert(document.plan_id.clone()) {
            return Err(PlanLoadError::DuplicatePlan(document.plan_id));
        }
        plans.push(build_plan(document)?);
    }
    Ok(plans)
}

/// Validate one document and build the plan.
///
/// # Errors
///
/// Returns `InvalidPlan` for malformed ids, symbols or price levels and
/// `InvalidFunction` for unusable function specs.
pub fn build_plan(document: PlanDocument) -> Result<TradePlan, PlanLoadError> {
    let invalid = |message: String| PlanLoadError::InvalidPlan {
        plan_id: document.plan_id.clone(),
        message,
    };

    if !plan_id_regex().is_match(&document.plan_id) {
        return Err(invalid(
            "plan_id must contain only A-Z, 0-9 and underscore".to_string(),
        ));
    }
    if !symbol_regex().is_match(&document.symbol) {
        return Err(invalid(format!(
            "symbol '{}' must be 1-10 uppercase letters",
            document.symbol
        )));
    }

    for (role, spec) in [
        (FunctionRole::Entry, &document.entry_function),
        (FunctionRole::Exit, &document.exit_function),
    ] {
        ExecutionFunctionKind::from_spec(spec, role).map_err(|source| {
            PlanLoadError::InvalidFunction {
                plan_id: document.plan_id.clone(),
                role,
                source,
            }
        })?;
    }

    let plan_id = document.plan_id.clone();
    TradePlan::create(NewTradePlan {
        id: PlanId::new(document.plan_id),
        symbol: Symbol::new(document.symbol),
        entry_level: document.entry_level,
        stop_loss: document.stop_loss,
        take_profit: document.take_profit,
        risk_category: document.risk_category,
        entry_function: document.entry_function,
        exit_function: document.exit_function,
    })
    .map_err(|e: DomainError| PlanLoadError::InvalidPlan {
        plan_id,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::market_data::Timeframe;
    use crate::domain::trade_plan::{FunctionType, TradeDirection, TradePlanStatus};

    const TWO_PLANS: &str = r"
- plan_id: AAPL_BREAKOUT
  symbol: AAPL
  entry_level: 180.50
  stop_loss: 178.00
  take_profit: 185.00
  risk_category: normal
  entry_function:
    function_type: close_above
    timeframe: 5min
    parameters:
      threshold: 180.50
      confirmation_bars: 2
  exit_function:
    function_type: trailing_stop
    timeframe: 5min
    parameters:
      trail_percent: 1.5
- plan_id: TSLA_FADE
  symbol: TSLA
  entry_level: 250
  stop_loss: 256
  take_profit: 238
  risk_category: small
  entry_function:
    function_type: close_below
    timeframe: 15min
    parameters:
      threshold: 250
  exit_function:
    function_type: close_above
    timeframe: 15min
    parameters:
      threshold: 256
      action: exit
";

    fn document(plan_id: &str, symbol: &str) -> PlanDocument {
        PlanDocument {
            plan_id: plan_id.to_string(),
            symbol: symbol.to_string(),
            entry_level: dec!(100),
            stop_loss: dec!(98),
            take_profit: dec!(104),
            risk_category: RiskCategory::Normal,
            entry_function: ExecutionFunctionSpec::new(FunctionType::CloseAbove, Timeframe::OneMinute)
                .with_param("threshold", "100"),
            exit_function: ExecutionFunctionSpec::new(FunctionType::TrailingStop, Timeframe::OneMinute)
                .with_param("trail_percent", "2"),
        }
    }

    #[test]
    fn loads_long_and_short_plans() {
        let plans = load_plans_from_str(TWO_PLANS).unwrap();
        assert_eq!(plans.len(), 2);

        let aapl = &plans[0];
        assert_eq!(aapl.id().as_str(), "AAPL_BREAKOUT");
        assert_eq!(aapl.entry_level(), dec!(180.50));
        assert_eq!(aapl.direction(), TradeDirection::Long);
        assert_eq!(aapl.status(), TradePlanStatus::AwaitingEntry);
        assert_eq!(aapl.entry_function().timeframe, Timeframe::FiveMinutes);

        let tsla = &plans[1];
        assert_eq!(tsla.direction(), TradeDirection::Short);
        assert_eq!(tsla.risk_category(), RiskCategory::Small);
    }

    #[test]
    fn bundled_plans_file_loads() {
        let plans = load_plans_from_str(include_str!("../../plans.yaml")).unwrap();
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|plan| plan.status().as_str() == "awaiting_entry"));
    }

    #[test]
    fn rejects_lowercase_plan_id() {
        let err = build_plan(document("aapl_breakout", "AAPL")).unwrap_err();
        assert!(matches!(err, PlanLoadError::InvalidPlan { .. }));
    }

    #[test]
    fn rejects_bad_symbol() {
        let err = build_plan(document("AAPL_1", "BRK.B")).unwrap_err();
        assert!(err.to_string().contains("symbol"));
    }

    #[test]
    fn rejects_trailing_stop_as_entry() {
        let mut doc = document("AAPL_1", "AAPL");
        doc.entry_function =
            ExecutionFunctionSpec::new(FunctionType::TrailingStop, Timeframe::OneMinute)
                .with_param("trail_percent", "2");

        let err = build_plan(doc).unwrap_err();
        assert!(matches!(
            err,
            PlanLoadError::InvalidFunction {
                role: FunctionRole::Entry,
                ..
            }
        ));
    }

    #[test]
    fn rejects_stop_equal_to_entry() {
        let mut doc = document("AAPL_1", "AAPL");
        doc.stop_loss = doc.entry_level;
        let err = build_plan(doc).unwrap_err();
        assert!(err.to_string().contains("stop_loss"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let yaml = format!("{}\n{}", TWO_PLANS, TWO_PLANS.replace("TSLA_FADE", "OTHER"));
        let err = load_plans_from_str(&yaml).unwrap_err();
        assert!(matches!(err, PlanLoadError::DuplicatePlan(id) if id == "AAPL_BREAKOUT"));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let plans = load_plans(dir.path().join("plans.yaml")).unwrap();
        assert!(plans.is_empty());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_PLANS.as_bytes()).unwrap();
        let plans = load_plans(file.path()).unwrap();
        assert_eq!(plans.len(), 2);
    }
}
