//! Dependency Injection Container
//!
//! Creates the adapters selected by configuration and wires them into the
//! scheduler, orchestrator and HTTP state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{NotificationPort, OrderPlacementPort, StatePersistencePort};
use crate::application::services::{
    BarCloseScheduler, SchedulerEvent, SystemClock, TradeLifecycleOrchestrator,
};
use crate::config::Config;
use crate::domain::risk_management::{PortfolioRiskRegistry, RiskError};
use crate::domain::shared::Money;
use crate::infrastructure::broker::SimulatedOrderGateway;
use crate::infrastructure::http::AppState;
use crate::infrastructure::market_data::InMemoryBarStore;
use crate::infrastructure::notification::LoggingNotifier;
use crate::infrastructure::persistence::JsonFileStateStore;

/// Orchestrator over the given order and persistence adapters.
pub type Engine<O, S> = TradeLifecycleOrchestrator<O, S, InMemoryBarStore, SystemClock>;

/// Container wiring errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// No order gateway exists for the configured mode.
    #[error("environment mode '{mode}' has no order gateway; live routing is provided externally")]
    UnsupportedMode {
        /// Configured mode.
        mode: String,
    },

    /// The risk registry rejected the configured limits.
    #[error(transparent)]
    Risk(#[from] RiskError),
}

/// Dependency injection container.
pub struct Container<O, S, N>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    N: NotificationPort + 'static,
{
    config: Config,
    bars: Arc<InMemoryBarStore>,
    orders: Arc<O>,
    persistence: Arc<S>,
    notifier: Arc<N>,
    registry: Arc<PortfolioRiskRegistry>,
    shutdown: CancellationToken,
}

impl Container<SimulatedOrderGateway, JsonFileStateStore, LoggingNotifier> {
    /// Paper-trading stack: simulated fills, JSON state file, log notifier.
    ///
    /// # Errors
    ///
    /// `UnsupportedMode` unless the mode is `PAPER`; `Risk` if the account
    /// value or ceiling is unusable.
    pub fn paper(config: Config, shutdown: CancellationToken) -> Result<Self, ContainerError> {
        if !config.environment.is_paper() {
            return Err(ContainerError::UnsupportedMode {
                mode: config.environment.mode.clone(),
            });
        }

        let bars = Arc::new(InMemoryBarStore::new());
        let orders = Arc::new(SimulatedOrderGateway::new(Arc::clone(&bars)));
        let persistence = Arc::new(JsonFileStateStore::new(&config.persistence.state_path));
        Self::new(
            config,
            bars,
            orders,
            persistence,
            Arc::new(LoggingNotifier::new()),
            shutdown,
        )
    }
}

impl<O, S, N> Container<O, S, N>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    N: NotificationPort + 'static,
{
    /// Create a container from explicit adapters.
    ///
    /// # Errors
    ///
    /// Returns `Risk` if the configured account value or ceiling is rejected.
    pub fn new(
        config: Config,
        bars: Arc<InMemoryBarStore>,
        orders: Arc<O>,
        persistence: Arc<S>,
        notifier: Arc<N>,
        shutdown: CancellationToken,
    ) -> Result<Self, ContainerError> {
        let registry = Arc::new(PortfolioRiskRegistry::new(
            Money::new(config.risk.account_value),
            config.risk.max_portfolio_risk_percent,
        )?);
        Ok(Self {
            config,
            bars,
            orders,
            persistence,
            notifier,
            registry,
            shutdown,
        })
    }

    /// Loaded configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Get the bar store.
    pub fn bars(&self) -> Arc<InMemoryBarStore> {
        Arc::clone(&self.bars)
    }

    /// Get the order placement port.
    pub fn orders(&self) -> Arc<O> {
        Arc::clone(&self.orders)
    }

    /// Get the persistence port.
    pub fn persistence(&self) -> Arc<S> {
        Arc::clone(&self.persistence)
    }

    /// Get the shared risk registry.
    pub fn registry(&self) -> Arc<PortfolioRiskRegistry> {
        Arc::clone(&self.registry)
    }

    /// Shutdown token shared by every background task.
    pub fn shutdown(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Build the scheduler and orchestrator. Must be called from within a
    /// Tokio runtime; returns the scheduler event stream to hand to
    /// [`TradeLifecycleOrchestrator::run`].
    pub fn engine(&self) -> (Arc<Engine<O, S>>, mpsc::Receiver<SchedulerEvent>) {
        let (scheduler, events) = BarCloseScheduler::new(
            Arc::clone(&self.bars),
            Arc::new(SystemClock),
            self.config.scheduler.to_scheduler_config(),
            self.shutdown.clone(),
        );
        let orchestrator = TradeLifecycleOrchestrator::new(
            Arc::clone(&self.orders),
            Arc::clone(&self.notifier),
            Arc::clone(&self.persistence),
            Arc::new(scheduler),
            Arc::clone(&self.registry),
            self.config.orders.to_orchestrator_config(),
            self.shutdown.clone(),
        );
        (orchestrator, events)
    }

    /// HTTP state over a built engine.
    pub fn app_state(&self, engine: &Arc<Engine<O, S>>) -> AppState<O, S, SystemClock> {
        AppState {
            orchestrator: Arc::clone(engine),
            bars: Arc::clone(&self.bars),
            mode: self.config.environment.mode.to_ascii_uppercase(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
