//! In-memory bar store.
//!
//! Completed bars keyed by (symbol, timeframe) and close time. Bars are
//! pushed in by the market data collaborator (or the HTTP ingest endpoint)
//! and read back by the scheduler through [`BarFeedPort`]. Bars are stored
//! as received; validation happens where they are consumed.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{BarFeedError, BarFeedPort};
use crate::domain::market_data::{Bar, Timeframe};
use crate::domain::shared::{Symbol, Timestamp};

type Series = BTreeMap<Timestamp, Bar>;

/// Bounded per-series bar history.
#[derive(Debug)]
pub struct InMemoryBarStore {
    series: RwLock<HashMap<(Symbol, Timeframe), Series>>,
    max_bars_per_series: usize,
}

impl InMemoryBarStore {
    /// Default history kept per series.
    pub const DEFAULT_MAX_BARS: usize = 1_000;

    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_BARS)
    }

    /// Create an empty store keeping at most `max_bars_per_series` bars per
    /// series.
    #[must_use]
    pub fn with_capacity(max_bars_per_series: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_bars_per_series: max_bars_per_series.max(1),
        }
    }

    /// Store a completed bar, replacing any bar with the same close time.
    pub fn ingest(&self, symbol: &Symbol, timeframe: Timeframe, bar: Bar) {
        let mut series = self.series.write();
        let bars = series.entry((symbol.clone(), timeframe)).or_default();
        bars.insert(bar.close_time, bar);
        while bars.len() > self.max_bars_per_series {
            bars.pop_first();
        }
    }

    /// Close of the most recent bar for `symbol` across all timeframes.
    #[must_use]
    pub fn latest_close(&self, symbol: &Symbol) -> Option<Decimal> {
        self.series
            .read()
            .iter()
            .filter(|((s, _), _)| s == symbol)
            .filter_map(|(_, bars)| bars.last_key_value().map(|(_, bar)| bar))
            .max_by_key(|bar| bar.close_time)
            .map(|bar| bar.close)
    }

    /// Number of bars held for a series.
    #[must_use]
    pub fn len(&self, symbol: &Symbol, timeframe: Timeframe) -> usize {
        self.series
            .read()
            .get(&(symbol.clone(), timeframe))
            .map_or(0, BTreeMap::len)
    }
}

impl Default for InMemoryBarStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarFeedPort for InMemoryBarStore {
    async fn completed_bar(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        close_time: Timestamp,
    ) -> Result<Option<Bar>, BarFeedError> {
        Ok(self
            .series
            .read()
            .get(&(symbol.clone(), timeframe))
            .and_then(|bars| bars.get(&close_time))
            .cloned())
    }

    async fn history(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Bar>, BarFeedError> {
        let series = self.series.read();
        let Some(bars) = series.get(&(symbol.clone(), timeframe)) else {
            return Ok(Vec::new());
        };
        let mut window: Vec<Bar> = bars
            .range(..before)
            .rev()
            .take(limit)
            .map(|(_, bar)| bar.clone())
            .collect();
        window.reverse();
        Ok(window)
    }
}
