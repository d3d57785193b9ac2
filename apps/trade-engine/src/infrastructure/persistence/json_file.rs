//! JSON file state store.
//!
//! The snapshot is written to a sibling temporary file and renamed over the
//! target, so a crash mid-write leaves the previous snapshot intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::application::ports::{EngineSnapshot, PersistenceError, StatePersistencePort};

/// Stores the engine snapshot as a single pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    /// Create a store writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl StatePersistencePort for JsonFileStateStore {
    async fn save_state(&self, snapshot: &EngineSnapshot) -> Result<(), PersistenceError> {
        let body = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &body)
            .await
            .map_err(|e| Self::io_error(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| Self::io_error(&self.path, e))?;

        tracing::trace!(
            path = %self.path.display(),
            plans = snapshot.plans.len(),
            positions = snapshot.positions.len(),
            "State saved"
        );
        Ok(())
    }

    async fn load_state(&self) -> Result<Option<EngineSnapshot>, PersistenceError> {
        let body = match tokio::fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&self.path, e)),
        };
        let snapshot = serde_json::from_slice(&body)?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::market_data::Timeframe;
    use crate::domain::shared::{PlanId, Symbol, Timestamp};
    use crate::domain::trade_plan::{
        ExecutionFunctionSpec, FunctionType, NewTradePlan, RiskCategory, TradePlan,
    };

    fn snapshot() -> EngineSnapshot {
        let plan = TradePlan::create(NewTradePlan {
            id: PlanId::new("MSFT_PULLBACK"),
            symbol: Symbol::new("MSFT"),
            entry_level: dec!(410),
            stop_loss: dec!(404),
            take_profit: dec!(425),
            risk_category: RiskCategory::Small,
            entry_function: ExecutionFunctionSpec::new(
                FunctionType::CloseAbove,
                Timeframe::FiveMinutes,
            )
            .with_param("threshold", "410"),
            exit_function: ExecutionFunctionSpec::new(
                FunctionType::TrailingStop,
                Timeframe::FiveMinutes,
            )
            .with_param("trail_percent", "1.5"),
        })
        .unwrap();

        EngineSnapshot {
            plans: vec![plan],
            positions: Vec::new(),
            reservations: Vec::new(),
            saved_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        assert!(store.load_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_restores_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("nested").join("state.json"));
        let original = snapshot();

        store.save_state(&original).await.unwrap();
        let loaded = store.load_state().await.unwrap().unwrap();

        assert_eq!(loaded, original);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileStateStore::new(path).load_state().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Serialization(_)));
    }
}
