//! Trade Lifecycle Orchestrator
//!
//! Drives every active plan through its state machine:
//!
//! ```text
//! awaiting_entry --(enter signal, reserve ok, entry fill)--> position_open
//! position_open  --(exit signal, exit fill)--------------> position_closed
//! awaiting_entry --(cancel)------------------------------> cancelled
//! any            --(order fault)-------------------------> error
//! ```
//!
//! Each plan lives behind its own async mutex. A bar close fans out to one
//! task per subscribed plan; a plan still acting on a previous signal is
//! skipped rather than queued, so evaluations and transitions for one plan
//! never overlap while different plans run in parallel. The portfolio risk
//! registry is the only state shared between plans.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::bar_close_scheduler::{BarCloseEvent, BarCloseScheduler, SchedulerEvent};
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::clock::Clock;
use super::notification_dispatcher::NotificationDispatcher;
use crate::application::ports::{
    BarFeedPort, EngineSnapshot, FillResult, NotificationPort, OrderPlacementError,
    OrderPlacementPort, StatePersistencePort,
};
use crate::domain::execution_functions::{
    AccountSnapshot, EvaluationContext, ExecutionFunction, ExecutionFunctionKind, FunctionError,
    PlanParameters, PositionState, SignalAction,
};
use crate::domain::market_data::Timeframe;
use crate::domain::risk_management::{PortfolioRiskRegistry, PositionSizer, RiskError, RiskSnapshot};
use crate::domain::shared::{DomainError, Money, OrderId, PlanId, PositionId, Timestamp};
use crate::domain::trade_plan::{
    FunctionRole, LifecycleEvent, LifecycleEventKind, Position, TradePlan, TradePlanStatus,
};
use crate::observability::{
    record_function_fault, record_order_submission, record_plan_transition, record_reservation,
    record_signal, update_portfolio_risk_percent,
};

const CANCEL_ATTEMPTS: u32 = 2;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on every order call, after which the order is treated as failed.
    pub fill_timeout: Duration,
    /// Order circuit breaker settings.
    pub breaker: CircuitBreakerConfig,
    /// Capacity of the notification queue.
    pub notification_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fill_timeout: Duration::from_secs(30),
            breaker: CircuitBreakerConfig::default(),
            notification_buffer: 256,
        }
    }
}

/// Errors returned by orchestrator commands.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A plan with this id is already active.
    #[error("plan already active: {plan_id}")]
    DuplicatePlan {
        /// Plan id.
        plan_id: PlanId,
    },

    /// No plan with this id.
    #[error("plan not found: {plan_id}")]
    PlanNotFound {
        /// Plan id.
        plan_id: PlanId,
    },

    /// The plan's status does not allow the command.
    #[error("cannot {action} plan {plan_id} in status {status}")]
    InvalidPlanState {
        /// Plan id.
        plan_id: PlanId,
        /// Current status.
        status: TradePlanStatus,
        /// Attempted command.
        action: &'static str,
    },

    /// An execution function spec failed validation.
    #[error("plan {plan_id} has an invalid {role} function: {source}")]
    InvalidFunction {
        /// Plan id.
        plan_id: PlanId,
        /// Slot.
        role: FunctionRole,
        /// Validation failure.
        source: FunctionError,
    },

    /// Risk registry failure.
    #[error(transparent)]
    Risk(#[from] RiskError),
}

/// Counts from a startup restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Plans resumed in `awaiting_entry` or `position_open`.
    pub resumed_plans: usize,
    /// Terminal plans kept for queries only.
    pub terminal_plans: usize,
    /// Open positions resumed.
    pub positions: usize,
    /// Reservations with no matching open position, released.
    pub orphaned_reservations: usize,
}

struct PlanRuntime {
    plan: TradePlan,
    position: Option<Position>,
    entry_fn: ExecutionFunctionKind,
    exit_fn: ExecutionFunctionKind,
}

impl PlanRuntime {
    fn build(plan: TradePlan, position: Option<Position>) -> Result<Self, OrchestratorError> {
        let entry_fn = ExecutionFunctionKind::from_spec(plan.entry_function(), FunctionRole::Entry)
            .map_err(|source| OrchestratorError::InvalidFunction {
                plan_id: plan.id().clone(),
                role: FunctionRole::Entry,
                source,
            })?;
        let exit_fn = ExecutionFunctionKind::from_spec(plan.exit_function(), FunctionRole::Exit)
            .map_err(|source| OrchestratorError::InvalidFunction {
                plan_id: plan.id().clone(),
                role: FunctionRole::Exit,
                source,
            })?;
        Ok(Self {
            plan,
            position,
            entry_fn,
            exit_fn,
        })
    }

    fn active_timeframe(&self) -> Option<Timeframe> {
        self.plan.active_function().map(|(_, spec)| spec.timeframe)
    }
}

enum OrderOutcome {
    Filled(FillResult),
    Failed(String),
}

/// Per-plan state machine driver.
pub struct TradeLifecycleOrchestrator<O, S, F, C>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    F: BarFeedPort + 'static,
    C: Clock,
{
    orders: Arc<O>,
    persistence: Arc<S>,
    scheduler: Arc<BarCloseScheduler<F, C>>,
    registry: Arc<PortfolioRiskRegistry>,
    sizer: PositionSizer,
    breaker: CircuitBreaker,
    notifications: NotificationDispatcher,
    config: OrchestratorConfig,
    runtimes: RwLock<HashMap<PlanId, Arc<tokio::sync::Mutex<PlanRuntime>>>>,
    views: RwLock<HashMap<PlanId, TradePlan>>,
    positions: RwLock<HashMap<PlanId, Position>>,
    persist_lock: tokio::sync::Mutex<()>,
    fatal: Mutex<Option<RiskError>>,
    shutdown: CancellationToken,
}

impl<O, S, F, C> TradeLifecycleOrchestrator<O, S, F, C>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    F: BarFeedPort + 'static,
    C: Clock,
{
    /// Create the orchestrator and start its notification dispatcher.
    /// Must be called from within a Tokio runtime.
    pub fn new<N>(
        orders: Arc<O>,
        notifier: Arc<N>,
        persistence: Arc<S>,
        scheduler: Arc<BarCloseScheduler<F, C>>,
        registry: Arc<PortfolioRiskRegistry>,
        config: OrchestratorConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self>
    where
        N: NotificationPort + 'static,
    {
        let (notifications, _dispatcher) =
            NotificationDispatcher::spawn(notifier, config.notification_buffer, shutdown.clone());

        Arc::new(Self {
            orders,
            persistence,
            scheduler,
            registry,
            sizer: PositionSizer::new(),
            breaker: CircuitBreaker::new(config.breaker),
            notifications,
            config,
            runtimes: RwLock::new(HashMap::new()),
            views: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            persist_lock: tokio::sync::Mutex::new(()),
            fatal: Mutex::new(None),
            shutdown,
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Start managing a plan in `awaiting_entry`. Both execution functions
    /// are built and validated here; a bad spec rejects the plan.
    pub async fn activate(&self, plan: TradePlan) -> Result<(), OrchestratorError> {
        if plan.status() != TradePlanStatus::AwaitingEntry {
            return Err(OrchestratorError::InvalidPlanState {
                plan_id: plan.id().clone(),
                status: plan.status(),
                action: "activate",
            });
        }
        if self.views.read().contains_key(plan.id()) {
            return Err(OrchestratorError::DuplicatePlan {
                plan_id: plan.id().clone(),
            });
        }

        let runtime = PlanRuntime::build(plan, None)?;
        let plan_id = runtime.plan.id().clone();
        let symbol = runtime.plan.symbol().clone();
        let timeframe = runtime.plan.entry_function().timeframe;

        {
            let mut runtimes = self.runtimes.write();
            if runtimes.contains_key(&plan_id) {
                return Err(OrchestratorError::DuplicatePlan { plan_id });
            }
            self.views
                .write()
                .insert(plan_id.clone(), runtime.plan.clone());
            runtimes.insert(
                plan_id.clone(),
                Arc::new(tokio::sync::Mutex::new(runtime)),
            );
        }

        self.scheduler.watch(&symbol, timeframe);
        tracing::info!(
            plan_id = %plan_id,
            symbol = %symbol,
            timeframe = %timeframe,
            "Plan activated"
        );
        self.persist().await;
        Ok(())
    }

    /// Cancel a plan. Only valid while awaiting entry; waits for any
    /// in-flight evaluation of the plan to finish first.
    pub async fn cancel(&self, plan_id: &PlanId, reason: &str) -> Result<TradePlan, OrchestratorError> {
        let runtime = self.runtimes.read().get(plan_id).cloned();
        let Some(runtime) = runtime else {
            return Err(match self.get_plan(plan_id) {
                Some(plan) => OrchestratorError::InvalidPlanState {
                    plan_id: plan_id.clone(),
                    status: plan.status(),
                    action: "cancel",
                },
                None => OrchestratorError::PlanNotFound {
                    plan_id: plan_id.clone(),
                },
            });
        };
        let mut rt = runtime.lock().await;

        let from = rt.plan.status();
        let timeframe = rt.active_timeframe();
        rt.plan
            .cancel(reason)
            .map_err(|_: DomainError| OrchestratorError::InvalidPlanState {
                plan_id: plan_id.clone(),
                status: from,
                action: "cancel",
            })?;

        if let Some(timeframe) = timeframe {
            self.scheduler.unwatch(rt.plan.symbol(), timeframe);
        }
        tracing::info!(plan_id = %plan_id, reason, "Plan cancelled");
        self.announce_transition(&rt.plan, from);
        self.sync_view(&rt);
        drop(rt);

        self.runtimes.write().remove(plan_id);
        self.persist().await;
        self.get_plan(plan_id)
            .ok_or_else(|| OrchestratorError::PlanNotFound {
                plan_id: plan_id.clone(),
            })
    }

    /// Resume from a persisted snapshot. Reservations are re-applied first;
    /// a snapshot whose reservations breach the ceiling is rejected as
    /// `RegistryCorrupted`.
    pub async fn restore(&self, snapshot: EngineSnapshot) -> Result<RestoreSummary, OrchestratorError> {
        let EngineSnapshot {
            plans,
            positions,
            reservations,
            saved_at,
        } = snapshot;

        self.registry.restore(reservations)?;

        let mut positions_by_plan: HashMap<PlanId, Position> = positions
            .into_iter()
            .map(|p| (p.plan_id.clone(), p))
            .collect();
        let mut summary = RestoreSummary::default();
        let mut live_positions = HashSet::new();

        for plan in plans {
            let plan_id = plan.id().clone();
            if plan.is_terminal() {
                self.views.write().insert(plan_id, plan);
                summary.terminal_plans += 1;
                continue;
            }

            let position = positions_by_plan.remove(&plan_id);
            let mut runtime = match PlanRuntime::build(plan.clone(), position) {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(plan_id = %plan_id, error = %e, "Restored plan has invalid functions");
                    let mut failed = plan;
                    if failed.fail(format!("restore failed: {e}")).is_ok() {
                        record_plan_transition(TradePlanStatus::Error.as_str());
                    }
                    self.views.write().insert(plan_id, failed);
                    continue;
                }
            };

            if runtime.plan.status() == TradePlanStatus::PositionOpen && runtime.position.is_none() {
                tracing::error!(plan_id = %plan_id, "Open plan restored without its position");
                let from = runtime.plan.status();
                if runtime
                    .plan
                    .fail("position record missing after restart")
                    .is_ok()
                {
                    self.announce_transition(&runtime.plan, from);
                }
                self.sync_view(&runtime);
                continue;
            }

            if let Some(position) = &runtime.position {
                live_positions.insert(position.id.clone());
                summary.positions += 1;
            }
            if let Some(timeframe) = runtime.active_timeframe() {
                self.scheduler.watch(runtime.plan.symbol(), timeframe);
            }
            self.sync_view(&runtime);
            self.runtimes
                .write()
                .insert(plan_id, Arc::new(tokio::sync::Mutex::new(runtime)));
            summary.resumed_plans += 1;
        }

        for reservation in self.registry.reservations() {
            if !live_positions.contains(&reservation.position_id) {
                tracing::warn!(
                    position_id = %reservation.position_id,
                    dollar_risk = %reservation.dollar_risk,
                    "Releasing reservation with no open position"
                );
                self.release(&reservation.position_id);
                summary.orphaned_reservations += 1;
            }
        }

        update_portfolio_risk_percent(decimal_to_f64(self.registry.current_portfolio_risk_percent()));
        tracing::info!(
            saved_at = %saved_at,
            resumed_plans = summary.resumed_plans,
            terminal_plans = summary.terminal_plans,
            positions = summary.positions,
            orphaned_reservations = summary.orphaned_reservations,
            "Engine state restored"
        );
        self.persist().await;
        Ok(summary)
    }

    /// Consume scheduler events until shutdown or until the scheduler
    /// channel closes.
    pub fn run(self: Arc<Self>, mut events: mpsc::Receiver<SchedulerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(SchedulerEvent::BarClosed(event)) => {
                            let dispatched = self.handle_bar_close(&event);
                            tracing::debug!(
                                event_id = %event.event_id(),
                                plans = dispatched.len(),
                                "Bar close dispatched"
                            );
                        }
                        Some(SchedulerEvent::DataQuality(warning)) => {
                            tracing::debug!(
                                symbol = %warning.symbol,
                                timeframe = %warning.timeframe,
                                close_time = %warning.close_time,
                                "Evaluations skipped for suppressed bar close"
                            );
                        }
                        None => break,
                    }
                }
            }
            tracing::info!("Trade lifecycle orchestrator stopped");
        })
    }

    /// Fan a bar close out to every plan whose active function watches its
    /// pair. Returns one handle per spawned evaluation.
    pub fn handle_bar_close(self: &Arc<Self>, event: &BarCloseEvent) -> Vec<JoinHandle<()>> {
        let targets: Vec<PlanId> = self
            .views
            .read()
            .values()
            .filter(|plan| {
                plan.symbol() == &event.symbol
                    && plan
                        .active_function()
                        .is_some_and(|(_, spec)| spec.timeframe == event.timeframe)
            })
            .map(|plan| plan.id().clone())
            .collect();

        let mut handles = Vec::with_capacity(targets.len());
        for plan_id in targets {
            let Some(runtime) = self.runtimes.read().get(&plan_id).cloned() else {
                continue;
            };
            let Ok(guard) = runtime.try_lock_owned() else {
                tracing::warn!(
                    plan_id = %plan_id,
                    event_id = %event.event_id(),
                    "Plan still acting on a previous signal, skipping bar close"
                );
                continue;
            };

            let this = Arc::clone(self);
            let event = event.clone();
            handles.push(tokio::spawn(async move {
                this.process_plan(guard, &event).await;
            }));
        }
        handles
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Plans in `awaiting_entry` or `position_open`, by id.
    #[must_use]
    pub fn list_active_plans(&self) -> Vec<TradePlan> {
        let mut plans: Vec<TradePlan> = self
            .views
            .read()
            .values()
            .filter(|plan| !plan.is_terminal())
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.id().cmp(b.id()));
        plans
    }

    /// Every known plan, terminal ones included, by id.
    #[must_use]
    pub fn list_plans(&self) -> Vec<TradePlan> {
        let mut plans: Vec<TradePlan> = self.views.read().values().cloned().collect();
        plans.sort_by(|a, b| a.id().cmp(b.id()));
        plans
    }

    /// Latest committed state of one plan.
    #[must_use]
    pub fn get_plan(&self, plan_id: &PlanId) -> Option<TradePlan> {
        self.views.read().get(plan_id).cloned()
    }

    /// Open position held by a plan.
    #[must_use]
    pub fn position(&self, plan_id: &PlanId) -> Option<Position> {
        self.positions.read().get(plan_id).cloned()
    }

    /// All open positions, by plan id.
    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.read().values().cloned().collect();
        positions.sort_by(|a, b| a.plan_id.cmp(&b.plan_id));
        positions
    }

    /// Reserved risk as a percentage of account value.
    #[must_use]
    pub fn current_portfolio_risk_percent(&self) -> Decimal {
        self.registry.current_portfolio_risk_percent()
    }

    /// Registry totals.
    #[must_use]
    pub fn risk_snapshot(&self) -> RiskSnapshot {
        self.registry.snapshot()
    }

    /// The fatal registry fault that stopped the engine, if any.
    #[must_use]
    pub fn fatal_error(&self) -> Option<RiskError> {
        self.fatal.lock().clone()
    }

    /// The scheduler feeding this orchestrator.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<BarCloseScheduler<F, C>> {
        &self.scheduler
    }

    /// Current state as persisted on every transition.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            plans: self.list_plans(),
            positions: self.open_positions(),
            reservations: self.registry.reservations(),
            saved_at: Timestamp::now(),
        }
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    async fn process_plan(&self, mut guard: OwnedMutexGuard<PlanRuntime>, event: &BarCloseEvent) {
        let rt = &mut *guard;
        let Some((role, spec)) = rt.plan.active_function() else {
            return;
        };
        if spec.timeframe != event.timeframe || rt.plan.symbol() != &event.symbol {
            return;
        }
        if spec
            .last_evaluated
            .is_some_and(|last| last >= event.close_time)
        {
            tracing::debug!(
                plan_id = %rt.plan.id(),
                event_id = %event.event_id(),
                "Bar close already evaluated"
            );
            return;
        }

        let plan_id = rt.plan.id().clone();
        let function = match role {
            FunctionRole::Entry => &mut rt.entry_fn,
            FunctionRole::Exit => &mut rt.exit_fn,
        };
        let name = function.name();

        let lookback = function.required_lookback();
        let window = if lookback == 0 {
            Vec::new()
        } else {
            match self
                .scheduler
                .feed()
                .history(&event.symbol, event.timeframe, event.close_time, lookback)
                .await
            {
                Ok(window) => window,
                Err(e) => {
                    tracing::warn!(
                        plan_id = %plan_id,
                        function = name,
                        error = %e,
                        "History unavailable, evaluation skipped"
                    );
                    return;
                }
            }
        };

        if let Some(position) = rt.position.as_mut() {
            position.mark_to_market(event.bar.close);
        }

        let ctx = EvaluationContext::new(
            event.symbol.clone(),
            event.timeframe,
            event.bar.clone(),
            window,
            PlanParameters::from(&rt.plan),
            rt.position.as_ref().map(PositionState::from),
            AccountSnapshot {
                account_value: self.registry.account_value(),
                portfolio_risk_percent: self.registry.current_portfolio_risk_percent(),
            },
        );
        let result = function.evaluate(&ctx);
        let watermark_moved = match (function.watermark(), rt.position.as_mut()) {
            (Some(mark), Some(position)) => position.record_watermark(mark),
            _ => false,
        };
        rt.plan.mark_evaluated(role, event.close_time);

        let signal = match result {
            Ok(signal) => signal,
            Err(e) if e.is_data_quality() => {
                tracing::warn!(
                    plan_id = %plan_id,
                    function = name,
                    error = %e,
                    "Evaluation skipped on data quality"
                );
                self.sync_view(rt);
                return;
            }
            Err(e) => {
                tracing::warn!(
                    plan_id = %plan_id,
                    function = name,
                    error = %e,
                    "Execution function fault, treating as no signal"
                );
                record_function_fault(name);
                self.sync_view(rt);
                return;
            }
        };

        record_signal(name, signal.action.as_str());
        tracing::debug!(
            plan_id = %plan_id,
            function = name,
            action = signal.action.as_str(),
            confidence = signal.confidence,
            reasoning = %signal.reasoning,
            "Signal evaluated"
        );

        if !signal.is_actionable() {
            self.sync_view(rt);
            if watermark_moved {
                self.persist().await;
            }
            return;
        }

        match (role, signal.action) {
            (FunctionRole::Entry, SignalAction::Enter) => {
                tracing::info!(plan_id = %plan_id, reasoning = %signal.reasoning, "Entry signal");
                self.enter(rt).await;
            }
            (FunctionRole::Exit, SignalAction::Exit) => {
                tracing::info!(plan_id = %plan_id, reasoning = %signal.reasoning, "Exit signal");
                self.exit(rt).await;
            }
            (role, action) => {
                tracing::warn!(
                    plan_id = %plan_id,
                    role = %role,
                    action = action.as_str(),
                    "Signal does not apply to the active function, ignored"
                );
                self.sync_view(rt);
            }
        }
    }

    // ========================================================================
    // Entry
    // ========================================================================

    async fn enter(&self, rt: &mut PlanRuntime) {
        let plan_id = rt.plan.id().clone();

        if !self.breaker.is_call_permitted() {
            tracing::warn!(plan_id = %plan_id, "Order circuit breaker open, entry skipped");
            self.skip_entry(rt, "order circuit breaker open".to_string());
            return;
        }

        let size = match self.sizer.size(
            self.registry.account_value(),
            rt.plan.risk_category().risk_percent(),
            rt.plan.entry_level(),
            rt.plan.stop_loss(),
        ) {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(plan_id = %plan_id, error = %e, "Position sizing failed");
                self.skip_entry(rt, e.to_string());
                return;
            }
        };
        if size.shares == 0 {
            tracing::warn!(
                plan_id = %plan_id,
                dollar_risk = %size.dollar_risk,
                "Risk budget buys zero shares, entry skipped"
            );
            self.skip_entry(
                rt,
                format!("risk budget {} buys zero shares", size.dollar_risk),
            );
            return;
        }

        let position_id = PositionId::generate();
        match self.registry.reserve(position_id.clone(), size.dollar_risk) {
            Ok(snapshot) => {
                record_reservation("granted");
                update_portfolio_risk_percent(decimal_to_f64(snapshot.portfolio_risk_percent));
                tracing::info!(
                    plan_id = %plan_id,
                    position_id = %position_id,
                    shares = size.shares,
                    dollar_risk = %size.dollar_risk,
                    portfolio_risk_percent = %snapshot.portfolio_risk_percent,
                    "Risk reserved"
                );
            }
            Err(e) if e.is_fatal() => {
                self.raise_fatal(e);
                return;
            }
            Err(e @ RiskError::PortfolioRiskExceeded { .. }) => {
                record_reservation("rejected");
                tracing::warn!(plan_id = %plan_id, error = %e, "Risk reservation rejected");
                self.notify(
                    &rt.plan,
                    LifecycleEventKind::ReservationRejected {
                        reason: e.to_string(),
                    },
                );
                self.sync_view(rt);
                return;
            }
            Err(e) => {
                tracing::warn!(plan_id = %plan_id, error = %e, "Risk reservation failed");
                self.skip_entry(rt, e.to_string());
                return;
            }
        }

        if let Err(e) = rt.plan.record_sizing(size.shares, size.dollar_risk) {
            tracing::error!(plan_id = %plan_id, error = %e, "Could not record sizing");
            self.release(&position_id);
            self.sync_view(rt);
            return;
        }

        let started = Instant::now();
        let outcome = self
            .await_fill("entry", self.orders.submit_entry(&rt.plan, size.shares))
            .await;
        let fill = match outcome {
            OrderOutcome::Filled(fill) => fill,
            OrderOutcome::Failed(reason) => {
                self.release(&position_id);
                self.fail_plan(rt, format!("entry order failed: {reason}")).await;
                return;
            }
        };
        tracing::info!(
            plan_id = %plan_id,
            order_id = %fill.order_id,
            quantity = fill.filled_quantity,
            price = %fill.average_price,
            latency_ms = started.elapsed().as_millis() as u64,
            "Entry filled"
        );

        let from = rt.plan.status();
        let entry_timeframe = rt.plan.entry_function().timeframe;
        if let Err(e) = rt.plan.mark_position_open(fill.filled_quantity) {
            tracing::error!(plan_id = %plan_id, error = %e, "Entry fill could not be applied");
            self.release(&position_id);
            self.fail_plan(rt, format!("entry fill could not be applied: {e}"))
                .await;
            return;
        }

        let mut position = Position::open(
            position_id.clone(),
            plan_id.clone(),
            rt.plan.symbol().clone(),
            rt.plan.direction(),
            fill.average_price,
            fill.filled_quantity,
            fill.filled_at,
        );

        let started = Instant::now();
        let protective = tokio::time::timeout(
            self.config.fill_timeout,
            self.orders.submit_protective(
                &position,
                rt.plan.stop_loss(),
                rt.plan.take_profit(),
            ),
        )
        .await;
        let latency = started.elapsed().as_secs_f64();
        match protective {
            Ok(Ok(ids)) => {
                record_order_submission("protective", "accepted", latency);
                tracing::info!(
                    plan_id = %plan_id,
                    stop_loss_order = %ids.stop_loss,
                    take_profit_order = %ids.take_profit,
                    "Protective orders placed"
                );
                position.protective_orders = Some(ids);
            }
            Ok(Err(e)) => {
                record_order_submission("protective", "rejected", latency);
                self.protective_failed(rt, e.to_string());
            }
            Err(_) => {
                record_order_submission("protective", "timeout", latency);
                self.protective_failed(
                    rt,
                    format!("not confirmed within {:?}", self.config.fill_timeout),
                );
            }
        }

        let exit_timeframe = rt.plan.exit_function().timeframe;
        self.scheduler.watch(rt.plan.symbol(), exit_timeframe);
        self.scheduler.unwatch(rt.plan.symbol(), entry_timeframe);

        self.notify(
            &rt.plan,
            LifecycleEventKind::EntryFilled {
                position_id,
                quantity: fill.filled_quantity,
                price: fill.average_price,
                dollar_risk: size.dollar_risk,
            },
        );
        rt.position = Some(position);
        self.announce_transition(&rt.plan, from);
        self.sync_view(rt);
        self.persist().await;
    }

    fn skip_entry(&self, rt: &PlanRuntime, reason: String) {
        self.notify(&rt.plan, LifecycleEventKind::EntrySkipped { reason });
        self.sync_view(rt);
    }

    fn protective_failed(&self, rt: &PlanRuntime, reason: String) {
        tracing::error!(
            plan_id = %rt.plan.id(),
            reason = %reason,
            "Protective orders failed, position left to the exit function"
        );
        self.notify(&rt.plan, LifecycleEventKind::ProtectiveOrdersFailed { reason });
    }

    // ========================================================================
    // Exit
    // ========================================================================

    async fn exit(&self, rt: &mut PlanRuntime) {
        let plan_id = rt.plan.id().clone();
        let Some(position) = rt.position.clone() else {
            tracing::error!(plan_id = %plan_id, "Exit signal without an open position");
            self.fail_plan(rt, "exit signal without an open position".to_string())
                .await;
            return;
        };

        let resting = position.protective_order_ids();
        if !resting.is_empty()
            && let Err(reason) = self.cancel_protectives(&plan_id, &resting).await
        {
            self.release(&position.id);
            self.fail_plan(rt, format!("protective orders not cancelled: {reason}"))
                .await;
            return;
        }

        let fill = match self
            .await_fill("exit", self.orders.submit_exit(&position))
            .await
        {
            OrderOutcome::Filled(fill) => fill,
            OrderOutcome::Failed(reason) => {
                self.release(&position.id);
                self.fail_plan(rt, format!("exit order failed: {reason}")).await;
                return;
            }
        };

        let realized_pnl = position.pnl_at(fill.average_price);
        let released = self.release(&position.id);
        if released.is_none() {
            tracing::warn!(
                plan_id = %plan_id,
                position_id = %position.id,
                "Closed position held no reservation"
            );
        }

        let from = rt.plan.status();
        if let Err(e) = rt
            .plan
            .mark_position_closed(format!("exit filled at {}", fill.average_price))
        {
            tracing::error!(plan_id = %plan_id, error = %e, "Exit fill could not be applied");
            self.fail_plan(rt, format!("exit fill could not be applied: {e}"))
                .await;
            return;
        }
        rt.position = None;
        self.scheduler
            .unwatch(rt.plan.symbol(), rt.plan.exit_function().timeframe);

        tracing::info!(
            plan_id = %plan_id,
            order_id = %fill.order_id,
            quantity = fill.filled_quantity,
            price = %fill.average_price,
            realized_pnl = %realized_pnl,
            "Exit filled"
        );
        self.notify(
            &rt.plan,
            LifecycleEventKind::ExitFilled {
                position_id: position.id,
                quantity: fill.filled_quantity,
                price: fill.average_price,
                realized_pnl,
            },
        );
        self.announce_transition(&rt.plan, from);
        self.sync_view(rt);
        self.runtimes.write().remove(&plan_id);
        self.persist().await;
    }

    /// Cancel resting protective orders, retrying once. An exit must not be
    /// sent while they may still fill.
    async fn cancel_protectives(&self, plan_id: &PlanId, ids: &[OrderId]) -> Result<(), String> {
        let mut failure = String::new();
        for attempt in 1..=CANCEL_ATTEMPTS {
            let started = Instant::now();
            let cancelled =
                tokio::time::timeout(self.config.fill_timeout, self.orders.cancel(ids)).await;
            let latency = started.elapsed().as_secs_f64();
            match cancelled {
                Ok(Ok(())) => {
                    record_order_submission("cancel", "accepted", latency);
                    tracing::info!(plan_id = %plan_id, orders = ids.len(), "Protective orders cancelled");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    record_order_submission("cancel", "rejected", latency);
                    failure = e.to_string();
                }
                Err(_) => {
                    record_order_submission("cancel", "timeout", latency);
                    failure = format!("not confirmed within {:?}", self.config.fill_timeout);
                }
            }
            tracing::warn!(plan_id = %plan_id, attempt, reason = %failure, "Protective order cancel failed");
        }
        Err(failure)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Run an order call under the fill timeout and feed the breaker.
    async fn await_fill<Fut>(&self, kind: &'static str, order: Fut) -> OrderOutcome
    where
        Fut: Future<Output = Result<FillResult, OrderPlacementError>>,
    {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.fill_timeout, order).await;
        let latency = started.elapsed().as_secs_f64();

        let (outcome, failure) = match result {
            Ok(Ok(fill)) if fill.filled_quantity > 0 => {
                record_order_submission(kind, "filled", latency);
                self.breaker.record_success();
                return OrderOutcome::Filled(fill);
            }
            Ok(Ok(fill)) => (
                "rejected",
                format!("order {} filled zero shares", fill.order_id),
            ),
            Ok(Err(e)) => ("rejected", e.to_string()),
            Err(_) => (
                "timeout",
                format!("fill not confirmed within {:?}", self.config.fill_timeout),
            ),
        };

        record_order_submission(kind, outcome, latency);
        self.breaker.record_failure();
        tracing::error!(kind, reason = %failure, "Order fault");
        OrderOutcome::Failed(failure)
    }

    async fn fail_plan(&self, rt: &mut PlanRuntime, reason: String) {
        let from = rt.plan.status();
        let timeframe = rt.active_timeframe();
        if let Err(e) = rt.plan.fail(reason.clone()) {
            tracing::error!(plan_id = %rt.plan.id(), error = %e, "Could not move plan to error");
            return;
        }
        if let Some(timeframe) = timeframe {
            self.scheduler.unwatch(rt.plan.symbol(), timeframe);
        }
        tracing::error!(plan_id = %rt.plan.id(), from = %from, reason = %reason, "Plan failed");
        self.announce_transition(&rt.plan, from);
        self.sync_view(rt);
        self.runtimes.write().remove(rt.plan.id());
        self.persist().await;
    }

    fn release(&self, position_id: &PositionId) -> Option<Money> {
        let released = self.registry.release(position_id);
        if let Some(amount) = released {
            record_reservation("released");
            update_portfolio_risk_percent(decimal_to_f64(
                self.registry.current_portfolio_risk_percent(),
            ));
            tracing::info!(position_id = %position_id, dollar_risk = %amount, "Risk released");
        }
        released
    }

    fn raise_fatal(&self, error: RiskError) {
        tracing::error!(error = %error, "Portfolio risk registry fault, shutting down");
        self.fatal.lock().get_or_insert(error);
        self.shutdown.cancel();
    }

    fn announce_transition(&self, plan: &TradePlan, from: TradePlanStatus) {
        let to = plan.status();
        let reason = plan.status_reason().unwrap_or_default().to_string();
        record_plan_transition(to.as_str());
        tracing::info!(
            plan_id = %plan.id(),
            symbol = %plan.symbol(),
            from = %from,
            to = %to,
            reason = %reason,
            "Plan status changed"
        );
        self.notify(plan, LifecycleEventKind::StatusChanged { from, to, reason });
    }

    fn notify(&self, plan: &TradePlan, kind: LifecycleEventKind) {
        self.notifications.dispatch(LifecycleEvent::new(
            plan.id().clone(),
            plan.symbol().clone(),
            kind,
        ));
    }

    fn sync_view(&self, rt: &PlanRuntime) {
        let plan_id = rt.plan.id().clone();
        match &rt.position {
            Some(position) => {
                self.positions
                    .write()
                    .insert(plan_id.clone(), position.clone());
            }
            None => {
                self.positions.write().remove(&plan_id);
            }
        }
        self.views.write().insert(plan_id, rt.plan.clone());
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        if let Err(e) = self.persistence.save_state(&snapshot).await {
            tracing::error!(error = %e, "Failed to persist engine state");
        }
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
