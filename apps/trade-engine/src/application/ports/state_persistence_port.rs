//! State Persistence Port (Driven Port)
//!
//! Save/load hooks for crash recovery. `save_state` runs on every plan
//! transition; `load_state` runs once at startup. Broker-side reconciliation
//! after loading belongs to the collaborator.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::risk_management::Reservation;
use crate::domain::shared::Timestamp;
use crate::domain::trade_plan::{Position, TradePlan};

/// Everything needed to resume after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// All known plans.
    pub plans: Vec<TradePlan>,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Risk registry contents.
    pub reservations: Vec<Reservation>,
    /// When the snapshot was taken.
    pub saved_at: Timestamp,
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Underlying I/O failed.
    #[error("state I/O error at '{path}': {source}")]
    Io {
        /// File involved.
        path: String,
        /// Cause.
        source: std::io::Error,
    },

    /// The stored state could not be (de)serialized.
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Port for saving and loading engine state.
#[async_trait]
pub trait StatePersistencePort: Send + Sync {
    /// Persist a snapshot, replacing the previous one.
    async fn save_state(&self, snapshot: &EngineSnapshot) -> Result<(), PersistenceError>;

    /// Load the latest snapshot, if any.
    async fn load_state(&self) -> Result<Option<EngineSnapshot>, PersistenceError>;
}

/// In-memory persistence for testing.
#[derive(Debug, Default)]
pub struct InMemoryStatePersistence {
    latest: Mutex<Option<EngineSnapshot>>,
    saves: Mutex<usize>,
}

impl InMemoryStatePersistence {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with a snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: EngineSnapshot) -> Self {
        Self {
            latest: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Latest saved snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<EngineSnapshot> {
        self.latest.lock().clone()
    }

    /// Number of saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl StatePersistencePort for InMemoryStatePersistence {
    async fn save_state(&self, snapshot: &EngineSnapshot) -> Result<(), PersistenceError> {
        *self.latest.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    async fn load_state(&self) -> Result<Option<EngineSnapshot>, PersistenceError> {
        Ok(self.latest.lock().clone())
    }
}
