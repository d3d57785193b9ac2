//! Bar-Close Scheduler
//!
//! Raises one close event per bar boundary for every watched
//! (symbol, timeframe) pair. Each pair is served by its own task that sleeps
//! until the next boundary, then polls the bar feed for the completed bar
//! until the grace window runs out. A bar that never arrives produces a
//! data-quality warning instead of an event. Missed boundaries are logged
//! and never replayed.
//!
//! Interest is reference counted: plans sharing a pair register once, and
//! monitoring stops when the last one unwatches.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use crate::application::ports::BarFeedPort;
use crate::domain::market_data::{Bar, Timeframe};
use crate::domain::shared::{Symbol, Timestamp};
use crate::observability::{record_bar_close_event, record_bar_close_suppressed};

const TIMING_SAMPLES: usize = 100;

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long to wait for a completed bar after its boundary.
    pub grace_window: Duration,
    /// Feed polling interval inside the grace window.
    pub poll_interval: Duration,
    /// Detection drift above which a boundary counts as late.
    pub accuracy: Duration,
    /// Daily session close, in UTC.
    pub daily_close: NaiveTime,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
            accuracy: Duration::from_secs(1),
            daily_close: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
            event_buffer: 256,
        }
    }
}

/// A bar boundary was crossed and the completed bar is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarCloseEvent {
    /// Symbol.
    pub symbol: Symbol,
    /// Timeframe.
    pub timeframe: Timeframe,
    /// Boundary the bar closed on.
    pub close_time: Timestamp,
    /// The completed bar.
    pub bar: Bar,
    /// The following boundary.
    pub next_close_time: Timestamp,
    /// When the boundary crossing was detected.
    pub detected_at: Timestamp,
}

impl BarCloseEvent {
    /// Stable id, e.g. `AAPL_15min_20240304_143000`.
    #[must_use]
    pub fn event_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.symbol,
            self.timeframe,
            self.close_time.as_datetime().format("%Y%m%d_%H%M%S")
        )
    }
}

/// Why a boundary produced no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataQualityIssue {
    /// No bar arrived within the grace window.
    MissingBar,
    /// The bar failed validation.
    InvalidBar {
        /// Validation failure.
        reason: String,
    },
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBar => f.write_str("bar not received within grace window"),
            Self::InvalidBar { reason } => write!(f, "invalid bar: {reason}"),
        }
    }
}

/// A boundary whose event was suppressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityWarning {
    /// Symbol.
    pub symbol: Symbol,
    /// Timeframe.
    pub timeframe: Timeframe,
    /// Boundary affected.
    pub close_time: Timestamp,
    /// What went wrong.
    pub issue: DataQualityIssue,
}

/// Output of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A bar closed.
    BarClosed(BarCloseEvent),
    /// A boundary was suppressed.
    DataQuality(DataQualityWarning),
}

/// Drift statistics over the most recent detections.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TimingStats {
    /// Samples in the window.
    pub samples: usize,
    /// Mean detection drift.
    pub mean_drift_ms: f64,
    /// Worst detection drift.
    pub max_drift_ms: f64,
    /// Detections later than the accuracy target since startup.
    pub late_count: u64,
}

#[derive(Debug, Default)]
struct TimingWindow {
    drifts_ms: VecDeque<f64>,
    late_count: u64,
}

impl TimingWindow {
    fn record(&mut self, drift_ms: f64, late: bool) {
        if self.drifts_ms.len() == TIMING_SAMPLES {
            self.drifts_ms.pop_front();
        }
        self.drifts_ms.push_back(drift_ms);
        if late {
            self.late_count += 1;
        }
    }

    fn stats(&self) -> TimingStats {
        let samples = self.drifts_ms.len();
        let mean_drift_ms = if samples == 0 {
            0.0
        } else {
            self.drifts_ms.iter().sum::<f64>() / samples as f64
        };
        TimingStats {
            samples,
            mean_drift_ms,
            max_drift_ms: self.drifts_ms.iter().copied().fold(0.0, f64::max),
            late_count: self.late_count,
        }
    }
}

type WatchKey = (Symbol, Timeframe);

#[derive(Debug)]
struct Watch {
    ref_count: usize,
    token: CancellationToken,
}

struct SchedulerShared<F, C> {
    feed: Arc<F>,
    clock: Arc<C>,
    config: SchedulerConfig,
    events: mpsc::Sender<SchedulerEvent>,
    last_emitted: Mutex<HashMap<WatchKey, DateTime<Utc>>>,
    timing: Mutex<TimingWindow>,
}

/// Owned registry of watched pairs and their boundary tasks.
pub struct BarCloseScheduler<F, C>
where
    F: BarFeedPort + 'static,
    C: Clock,
{
    shared: Arc<SchedulerShared<F, C>>,
    watches: Mutex<HashMap<WatchKey, Watch>>,
    shutdown: CancellationToken,
}

impl<F, C> BarCloseScheduler<F, C>
where
    F: BarFeedPort + 'static,
    C: Clock,
{
    /// Create a scheduler and the receiver for its events. Cancelling
    /// `shutdown` stops every boundary task.
    #[must_use]
    pub fn new(
        feed: Arc<F>,
        clock: Arc<C>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<SchedulerEvent>) {
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let scheduler = Self {
            shared: Arc::new(SchedulerShared {
                feed,
                clock,
                config,
                events: tx,
                last_emitted: Mutex::new(HashMap::new()),
                timing: Mutex::new(TimingWindow::default()),
            }),
            watches: Mutex::new(HashMap::new()),
            shutdown,
        };
        (scheduler, rx)
    }

    /// Register interest in a pair. The first registration starts its
    /// boundary task; later ones only bump the count. Must be called from
    /// within a Tokio runtime. Returns the new reference count.
    pub fn watch(&self, symbol: &Symbol, timeframe: Timeframe) -> usize {
        let mut watches = self.watches.lock();
        let key = (symbol.clone(), timeframe);
        if let Some(watch) = watches.get_mut(&key) {
            watch.ref_count += 1;
            return watch.ref_count;
        }

        let token = self.shutdown.child_token();
        tokio::spawn(run_pair(
            Arc::clone(&self.shared),
            symbol.clone(),
            timeframe,
            token.clone(),
        ));
        watches.insert(
            key,
            Watch {
                ref_count: 1,
                token,
            },
        );
        tracing::info!(symbol = %symbol, timeframe = %timeframe, "Started bar-close monitoring");
        1
    }

    /// Drop one registration. Monitoring stops when the count reaches zero.
    /// Unknown pairs are ignored. Returns the remaining count.
    pub fn unwatch(&self, symbol: &Symbol, timeframe: Timeframe) -> usize {
        let mut watches = self.watches.lock();
        let key = (symbol.clone(), timeframe);
        let Some(watch) = watches.get_mut(&key) else {
            tracing::debug!(symbol = %symbol, timeframe = %timeframe, "Unwatch of unmonitored pair ignored");
            return 0;
        };

        watch.ref_count -= 1;
        if watch.ref_count > 0 {
            return watch.ref_count;
        }

        if let Some(watch) = watches.remove(&key) {
            watch.token.cancel();
        }
        tracing::info!(symbol = %symbol, timeframe = %timeframe, "Stopped bar-close monitoring");
        0
    }

    /// Current registration count for a pair.
    #[must_use]
    pub fn ref_count(&self, symbol: &Symbol, timeframe: Timeframe) -> usize {
        self.watches
            .lock()
            .get(&(symbol.clone(), timeframe))
            .map_or(0, |w| w.ref_count)
    }

    /// All monitored pairs, sorted.
    #[must_use]
    pub fn watched_pairs(&self) -> Vec<(Symbol, Timeframe)> {
        let mut pairs: Vec<_> = self.watches.lock().keys().cloned().collect();
        pairs.sort();
        pairs
    }

    /// Drift statistics over the last 100 detections.
    #[must_use]
    pub fn timing_stats(&self) -> TimingStats {
        self.shared.timing.lock().stats()
    }

    /// The bar feed the scheduler polls.
    #[must_use]
    pub fn feed(&self) -> &Arc<F> {
        &self.shared.feed
    }

    /// The clock boundaries are measured against.
    #[must_use]
    pub fn clock(&self) -> &Arc<C> {
        &self.shared.clock
    }

    /// Daily session close used for `1day` boundaries.
    #[must_use]
    pub fn daily_close(&self) -> NaiveTime {
        self.shared.config.daily_close
    }
}

/// Boundary loop for one pair.
async fn run_pair<F, C>(
    shared: Arc<SchedulerShared<F, C>>,
    symbol: Symbol,
    timeframe: Timeframe,
    token: CancellationToken,
) where
    F: BarFeedPort,
    C: Clock,
{
    let daily_close = shared.config.daily_close;
    let mut next = timeframe.next_boundary_after(shared.clock.now(), daily_close);

    loop {
        let wait = (next - shared.clock.now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }

        let boundary = next;
        let now = shared.clock.now();
        next = timeframe.next_boundary_after(now.max(boundary), daily_close);

        let outcome = handle_boundary(&shared, &symbol, timeframe, boundary, next, &token).await;
        if outcome == BoundaryOutcome::Stop {
            break;
        }
    }

    tracing::debug!(symbol = %symbol, timeframe = %timeframe, "Bar-close task exited");
}

#[derive(Debug, PartialEq, Eq)]
enum BoundaryOutcome {
    Continue,
    Stop,
}

async fn handle_boundary<F, C>(
    shared: &SchedulerShared<F, C>,
    symbol: &Symbol,
    timeframe: Timeframe,
    boundary: DateTime<Utc>,
    next: DateTime<Utc>,
    token: &CancellationToken,
) -> BoundaryOutcome
where
    F: BarFeedPort,
    C: Clock,
{
    let key = (symbol.clone(), timeframe);
    let config = &shared.config;

    if shared
        .last_emitted
        .lock()
        .get(&key)
        .is_some_and(|last| *last >= boundary)
    {
        tracing::debug!(symbol = %symbol, timeframe = %timeframe, boundary = %boundary, "Boundary already handled");
        return BoundaryOutcome::Continue;
    }

    let detected_at = shared.clock.now();
    let latest = timeframe.last_boundary_at_or_before(detected_at, config.daily_close);
    if latest > boundary {
        tracing::warn!(
            symbol = %symbol,
            timeframe = %timeframe,
            boundary = %boundary,
            detected_at = %detected_at,
            "Bar close superseded before detection, skipping"
        );
        record_bar_close_suppressed(timeframe.as_str(), "superseded");
        shared.last_emitted.lock().insert(key, boundary);
        return BoundaryOutcome::Continue;
    }

    let drift = (detected_at - boundary).to_std().unwrap_or(Duration::ZERO);
    let late = drift > config.accuracy;
    shared
        .timing
        .lock()
        .record(drift.as_secs_f64() * 1000.0, late);
    if late {
        tracing::warn!(
            symbol = %symbol,
            timeframe = %timeframe,
            drift_ms = drift.as_millis() as u64,
            "Late bar close detection"
        );
    }

    let close_time = Timestamp::new(boundary);
    let Some(bar) = await_bar(shared, symbol, timeframe, close_time, token).await else {
        if token.is_cancelled() {
            return BoundaryOutcome::Stop;
        }
        shared.last_emitted.lock().insert(key, boundary);
        return publish_warning(shared, symbol, timeframe, close_time, DataQualityIssue::MissingBar, token).await;
    };

    shared.last_emitted.lock().insert(key, boundary);

    if let Err(e) = bar.validate() {
        let issue = DataQualityIssue::InvalidBar {
            reason: e.to_string(),
        };
        return publish_warning(shared, symbol, timeframe, close_time, issue, token).await;
    }

    record_bar_close_event(timeframe.as_str(), drift.as_secs_f64());
    tracing::debug!(
        symbol = %symbol,
        timeframe = %timeframe,
        close_time = %close_time,
        close = %bar.close,
        "Bar closed"
    );

    let event = SchedulerEvent::BarClosed(BarCloseEvent {
        symbol: symbol.clone(),
        timeframe,
        close_time,
        bar,
        next_close_time: Timestamp::new(next),
        detected_at: Timestamp::new(detected_at),
    });
    publish(shared, event, token).await
}

/// Poll the feed until the bar arrives, the grace window expires, or the
/// task is cancelled.
async fn await_bar<F, C>(
    shared: &SchedulerShared<F, C>,
    symbol: &Symbol,
    timeframe: Timeframe,
    close_time: Timestamp,
    token: &CancellationToken,
) -> Option<Bar>
where
    F: BarFeedPort,
    C: Clock,
{
    let config = &shared.config;
    let deadline = close_time.as_datetime()
        + chrono::Duration::from_std(config.grace_window).unwrap_or(chrono::Duration::zero());

    loop {
        match shared.feed.completed_bar(symbol, timeframe, close_time).await {
            Ok(Some(bar)) => return Some(bar),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "Bar feed query failed");
            }
        }

        let remaining = (deadline - shared.clock.now()).to_std().unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            return None;
        }

        tokio::select! {
            () = token.cancelled() => return None,
            () = tokio::time::sleep(config.poll_interval.min(remaining)) => {}
        }
    }
}

async fn publish_warning<F, C>(
    shared: &SchedulerShared<F, C>,
    symbol: &Symbol,
    timeframe: Timeframe,
    close_time: Timestamp,
    issue: DataQualityIssue,
    token: &CancellationToken,
) -> BoundaryOutcome
where
    F: BarFeedPort,
    C: Clock,
{
    let reason = match &issue {
        DataQualityIssue::MissingBar => "missing_bar",
        DataQualityIssue::InvalidBar { .. } => "invalid_bar",
    };
    record_bar_close_suppressed(timeframe.as_str(), reason);
    tracing::warn!(
        symbol = %symbol,
        timeframe = %timeframe,
        close_time = %close_time,
        issue = %issue,
        "Bar close suppressed"
    );

    let warning = SchedulerEvent::DataQuality(DataQualityWarning {
        symbol: symbol.clone(),
        timeframe,
        close_time,
        issue,
    });
    publish(shared, warning, token).await
}

async fn publish<F, C>(
    shared: &SchedulerShared<F, C>,
    event: SchedulerEvent,
    token: &CancellationToken,
) -> BoundaryOutcome
where
    F: BarFeedPort,
    C: Clock,
{
    tokio::select! {
        () = token.cancelled() => BoundaryOutcome::Stop,
        sent = shared.events.send(event) => {
            if sent.is_err() {
                tracing::debug!("Scheduler event receiver dropped");
                BoundaryOutcome::Stop
            } else {
                BoundaryOutcome::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::BarFeedError;
    use crate::application::services::TokioClock;

    #[derive(Default)]
    struct FakeFeed {
        bars: Mutex<HashMap<(Symbol, Timeframe, Timestamp), Bar>>,
    }

    impl FakeFeed {
        fn add(&self, symbol: &str, timeframe: Timeframe, close_time: DateTime<Utc>) {
            let bar = Bar {
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: dec!(100.5),
                volume: 1_000,
                close_time: Timestamp::new(close_time),
            };
            self.bars
                .lock()
                .insert((Symbol::new(symbol), timeframe, bar.close_time), bar);
        }
    }

    #[async_trait]
    impl BarFeedPort for FakeFeed {
        async fn completed_bar(
            &self,
            symbol: &Symbol,
            timeframe: Timeframe,
            close_time: Timestamp,
        ) -> Result<Option<Bar>, BarFeedError> {
            Ok(self
                .bars
                .lock()
                .get(&(symbol.clone(), timeframe, close_time))
                .cloned())
        }

        async fn history(
            &self,
            _symbol: &Symbol,
            _timeframe: Timeframe,
            _before: Timestamp,
            _limit: usize,
        ) -> Result<Vec<Bar>, BarFeedError> {
            Ok(vec![])
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
    }

    fn scheduler(
        feed: Arc<FakeFeed>,
        start: DateTime<Utc>,
    ) -> (
        BarCloseScheduler<FakeFeed, TokioClock>,
        mpsc::Receiver<SchedulerEvent>,
    ) {
        BarCloseScheduler::new(
            feed,
            Arc::new(TokioClock::starting_at(start)),
            SchedulerConfig::default(),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn emits_event_at_boundary() {
        let feed = Arc::new(FakeFeed::default());
        feed.add("AAPL", Timeframe::OneMinute, at(14, 30, 0));
        let (scheduler, mut rx) = scheduler(Arc::clone(&feed), at(14, 29, 58));

        scheduler.watch(&Symbol::new("AAPL"), Timeframe::OneMinute);

        let Some(SchedulerEvent::BarClosed(event)) = rx.recv().await else {
            panic!("expected bar close");
        };
        assert_eq!(event.close_time, Timestamp::new(at(14, 30, 0)));
        assert_eq!(event.next_close_time, Timestamp::new(at(14, 31, 0)));
        assert_eq!(event.event_id(), "AAPL_1min_20240304_143000");
        let drift = event.detected_at.as_datetime() - event.close_time.as_datetime();
        assert!(drift <= chrono::Duration::seconds(1));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_pair_is_monitored_once() {
        let feed = Arc::new(FakeFeed::default());
        feed.add("MSFT", Timeframe::OneMinute, at(10, 1, 0));
        feed.add("MSFT", Timeframe::OneMinute, at(10, 2, 0));
        let (scheduler, mut rx) = scheduler(Arc::clone(&feed), at(10, 0, 30));
        let symbol = Symbol::new("MSFT");

        assert_eq!(scheduler.watch(&symbol, Timeframe::OneMinute), 1);
        assert_eq!(scheduler.watch(&symbol, Timeframe::OneMinute), 2);
        assert_eq!(scheduler.watched_pairs().len(), 1);

        let mut seen = Vec::new();
        for _ in 0..2 {
            match rx.recv().await {
                Some(SchedulerEvent::BarClosed(event)) => seen.push(event.close_time),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(
            seen,
            vec![Timestamp::new(at(10, 1, 0)), Timestamp::new(at(10, 2, 0))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_bar_raises_data_quality_warning() {
        let feed = Arc::new(FakeFeed::default());
        let (scheduler, mut rx) = scheduler(Arc::clone(&feed), at(9, 59, 59));

        scheduler.watch(&Symbol::new("TSLA"), Timeframe::OneMinute);

        match rx.recv().await {
            Some(SchedulerEvent::DataQuality(warning)) => {
                assert_eq!(warning.close_time, Timestamp::new(at(10, 0, 0)));
                assert_eq!(warning.issue, DataQualityIssue::MissingBar);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unwatch_to_zero_stops_monitoring() {
        let feed = Arc::new(FakeFeed::default());
        feed.add("AAPL", Timeframe::OneMinute, at(14, 31, 0));
        let (scheduler, mut rx) = scheduler(Arc::clone(&feed), at(14, 30, 10));
        let symbol = Symbol::new("AAPL");

        scheduler.watch(&symbol, Timeframe::OneMinute);
        scheduler.watch(&symbol, Timeframe::OneMinute);
        assert_eq!(scheduler.unwatch(&symbol, Timeframe::OneMinute), 1);
        assert_eq!(scheduler.unwatch(&symbol, Timeframe::OneMinute), 0);
        assert_eq!(scheduler.unwatch(&symbol, Timeframe::OneMinute), 0);
        assert!(scheduler.watched_pairs().is_empty());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timing_stats_track_detections() {
        let feed = Arc::new(FakeFeed::default());
        feed.add("AAPL", Timeframe::OneMinute, at(14, 30, 0));
        let (scheduler, mut rx) = scheduler(Arc::clone(&feed), at(14, 29, 30));

        scheduler.watch(&Symbol::new("AAPL"), Timeframe::OneMinute);
        rx.recv().await;

        let stats = scheduler.timing_stats();
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.late_count, 0);
        assert!(stats.max_drift_ms < 1000.0);
    }

    #[test]
    fn timing_window_keeps_last_hundred() {
        let mut window = TimingWindow::default();
        for i in 0..150 {
            window.record(f64::from(i), i >= 140);
        }
        let stats = window.stats();
        assert_eq!(stats.samples, 100);
        assert_eq!(stats.late_count, 10);
        assert!((stats.max_drift_ms - 149.0).abs() < f64::EPSILON);
    }
}
