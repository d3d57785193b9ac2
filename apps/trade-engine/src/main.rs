//! Trade Engine Binary
//!
//! Starts the bar-close driven trade execution core in paper mode.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-engine -- config.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `TRADE_ENGINE_CONFIG`: config file path when no argument is given (default: config.yaml)
//! - `RUST_LOG`: Log level (default: info)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`: span export, see `telemetry`
//!
//! Any `${VAR}` in the config file is interpolated from the environment.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use trade_engine::application::ports::StatePersistencePort;
use trade_engine::config::{Config, load_config};
use trade_engine::infrastructure::broker::SimulatedOrderGateway;
use trade_engine::infrastructure::container::{Container, Engine};
use trade_engine::infrastructure::http::create_router;
use trade_engine::infrastructure::notification::LoggingNotifier;
use trade_engine::infrastructure::persistence::JsonFileStateStore;
use trade_engine::infrastructure::plan_loader::load_plans;
use trade_engine::observability::{MetricsConfig, init_metrics};
use trade_engine::telemetry::init_telemetry;

/// Grace period for background tasks after shutdown is requested.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type PaperContainer = Container<SimulatedOrderGateway, JsonFileStateStore, LoggingNotifier>;
type PaperEngine = Engine<SimulatedOrderGateway, JsonFileStateStore>;

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    let _telemetry = init_telemetry();

    match run().await {
        Ok(()) => {
            tracing::info!("Trade engine stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Trade engine failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    tracing::info!("Starting Trade Engine");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TRADE_ENGINE_CONFIG").ok());
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    log_config(&config);

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_addr.parse()?;
        init_metrics(&MetricsConfig::with_addr(addr)).context("starting metrics exporter")?;
        tracing::info!(%addr, "Prometheus metrics exporter started");
    }

    let shutdown = CancellationToken::new();
    let container = Container::paper(config, shutdown.clone()).context("wiring engine")?;
    let (engine, events) = container.engine();

    restore_state(&container, &engine)
        .await
        .context("restoring saved state")?;
    activate_plans(&container, &engine)
        .await
        .context("loading trade plans")?;

    let orchestrator_handle = Arc::clone(&engine).run(events);

    let http_addr: SocketAddr = container.config().http.listen_addr().parse()?;
    let app = create_router(container.app_state(&engine));
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {http_addr}"))?;
    tracing::info!(%http_addr, "HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /api/v1/plans");
    tracing::info!("  GET  /api/v1/plans/{{plan_id}}");
    tracing::info!("  POST /api/v1/plans/{{plan_id}}/cancel");
    tracing::info!("  GET  /api/v1/risk");
    tracing::info!("  POST /api/v1/bars/{{symbol}}/{{timeframe}}");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let server_token = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await });

    tracing::info!(
        active_plans = engine.list_active_plans().len(),
        "Trade engine ready"
    );
    server.await?;
    shutdown.cancel();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, orchestrator_handle)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Orchestrator did not stop in time"
        );
    }

    if let Some(fatal) = engine.fatal_error() {
        anyhow::bail!("halted on fatal risk registry fault: {fatal}");
    }
    Ok(())
}

/// Log the loaded configuration.
fn log_config(config: &Config) {
    tracing::info!(
        mode = %config.environment.mode,
        account_value = %config.risk.account_value,
        max_portfolio_risk_percent = %config.risk.max_portfolio_risk_percent,
        http_port = config.http.port,
        state_path = %config.persistence.state_path,
        plans_path = %config.persistence.plans_path,
        "Configuration loaded"
    );
}

/// Resume plans, positions and reservations from the last snapshot.
async fn restore_state(container: &PaperContainer, engine: &Arc<PaperEngine>) -> anyhow::Result<()> {
    let Some(snapshot) = container.persistence().load_state().await? else {
        tracing::info!("No saved state, starting fresh");
        return Ok(());
    };
    let summary = engine.restore(snapshot).await?;
    tracing::info!(
        resumed_plans = summary.resumed_plans,
        positions = summary.positions,
        "Recovered from saved state"
    );
    Ok(())
}

/// Activate plans from the plans file that are not already known.
async fn activate_plans(container: &PaperContainer, engine: &Arc<PaperEngine>) -> anyhow::Result<()> {
    let plans = load_plans(&container.config().persistence.plans_path)?;
    for plan in plans {
        if engine.get_plan(plan.id()).is_some() {
            tracing::debug!(plan_id = %plan.id(), "Plan already restored, skipping");
            continue;
        }
        let plan_id = plan.id().clone();
        if let Err(e) = engine.activate(plan).await {
            tracing::error!(plan_id = %plan_id, error = %e, "Failed to activate plan");
        }
    }
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
