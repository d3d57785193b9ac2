//! Bar Feed Port (Driven Port)
//!
//! Lookup of completed bars from the market data collaborator.

use async_trait::async_trait;

use crate::domain::market_data::{Bar, Timeframe};
use crate::domain::shared::{Symbol, Timestamp};

/// Bar feed errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BarFeedError {
    /// The feed could not be queried.
    #[error("bar feed unavailable: {message}")]
    Unavailable {
        /// Detail.
        message: String,
    },
}

/// Port for reading completed bars.
#[async_trait]
pub trait BarFeedPort: Send + Sync {
    /// The bar for `symbol`/`timeframe` that closed at `close_time`, if it has
    /// arrived.
    async fn completed_bar(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        close_time: Timestamp,
    ) -> Result<Option<Bar>, BarFeedError>;

    /// Up to `limit` bars closing strictly before `before`, oldest first.
    async fn history(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Bar>, BarFeedError>;
}
