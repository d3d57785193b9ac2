//! HTTP Controller (Driver Adapter)
//!
//! Axum-based REST API over the trade lifecycle orchestrator.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::application::ports::{OrderPlacementPort, StatePersistencePort};
use crate::application::services::{Clock, TradeLifecycleOrchestrator};
use crate::domain::market_data::{Bar, Timeframe};
use crate::domain::shared::{PlanId, Symbol};
use crate::domain::trade_plan::TradePlan;
use crate::error::EngineError;
use crate::infrastructure::market_data::InMemoryBarStore;

use super::request::{CancelPlanRequest, IngestBarRequest, ListPlansQuery};
use super::response::{
    HealthResponse, IngestBarResponse, ListPlansResponse, PlanResponse, RiskResponse,
    WatchedPairResponse,
};

type Orchestrator<O, S, C> = TradeLifecycleOrchestrator<O, S, InMemoryBarStore, C>;

/// Application state shared across handlers.
pub struct AppState<O, S, C>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    /// Plan lifecycle driver.
    pub orchestrator: Arc<Orchestrator<O, S, C>>,
    /// Bar store fed by the ingest endpoint.
    pub bars: Arc<InMemoryBarStore>,
    /// Trading mode.
    pub mode: String,
    /// Application version.
    pub version: String,
}

impl<O, S, C> Clone for AppState<O, S, C>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            bars: Arc::clone(&self.bars),
            mode: self.mode.clone(),
            version: self.version.clone(),
        }
    }
}

impl<O, S, C> AppState<O, S, C>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    fn plan_response(&self, plan: TradePlan) -> PlanResponse {
        let position = self.orchestrator.position(plan.id());
        PlanResponse { plan, position }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router<O, S, C>(state: AppState<O, S, C>) -> Router
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/plans", get(list_plans))
        .route("/api/v1/plans/{plan_id}", get(get_plan))
        .route("/api/v1/plans/{plan_id}/cancel", post(cancel_plan))
        .route("/api/v1/risk", get(get_risk))
        .route("/api/v1/bars/{symbol}/{timeframe}", post(ingest_bar))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check<O, S, C>(State(state): State<AppState<O, S, C>>) -> impl IntoResponse
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    let (status_code, status) = if state.orchestrator.fatal_error().is_some() {
        (StatusCode::SERVICE_UNAVAILABLE, "halted")
    } else {
        (StatusCode::OK, "healthy")
    };
    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: state.version.clone(),
            mode: state.mode.clone(),
        }),
    )
}

/// List plans. `?status=all` includes terminal plans.
async fn list_plans<O, S, C>(
    State(state): State<AppState<O, S, C>>,
    Query(query): Query<ListPlansQuery>,
) -> Result<Json<ListPlansResponse>, EngineError>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    let plans = match query.status.as_deref() {
        None | Some("active") => state.orchestrator.list_active_plans(),
        Some("all") => state.orchestrator.list_plans(),
        Some(other) => {
            return Err(EngineError::invalid_request(format!(
                "status filter must be 'active' or 'all', got '{other}'"
            )));
        }
    };

    let plans: Vec<PlanResponse> = plans
        .into_iter()
        .map(|plan| state.plan_response(plan))
        .collect();
    Ok(Json(ListPlansResponse {
        count: plans.len(),
        plans,
    }))
}

/// Get one plan.
async fn get_plan<O, S, C>(
    State(state): State<AppState<O, S, C>>,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanResponse>, EngineError>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    let plan = state
        .orchestrator
        .get_plan(&PlanId::new(plan_id.as_str()))
        .ok_or_else(|| EngineError::plan_not_found(&plan_id))?;
    Ok(Json(state.plan_response(plan)))
}

/// Cancel a plan awaiting entry.
async fn cancel_plan<O, S, C>(
    State(state): State<AppState<O, S, C>>,
    Path(plan_id): Path<String>,
    body: Bytes,
) -> Result<Json<PlanResponse>, EngineError>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    let request: CancelPlanRequest = if body.is_empty() {
        CancelPlanRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| EngineError::invalid_request(format!("invalid cancel request: {e}")))?
    };
    let reason = request
        .reason
        .unwrap_or_else(|| "cancelled by operator".to_string());

    let plan = state
        .orchestrator
        .cancel(&PlanId::new(plan_id), &reason)
        .await?;
    Ok(Json(state.plan_response(plan)))
}

/// Portfolio risk, open positions and scheduler timing.
async fn get_risk<O, S, C>(State(state): State<AppState<O, S, C>>) -> Json<RiskResponse>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    let scheduler = state.orchestrator.scheduler();
    let watched_pairs = scheduler
        .watched_pairs()
        .into_iter()
        .map(|(symbol, timeframe)| WatchedPairResponse {
            subscribers: scheduler.ref_count(&symbol, timeframe),
            symbol,
            timeframe,
        })
        .collect();

    Json(RiskResponse {
        risk: state.orchestrator.risk_snapshot(),
        positions: state.orchestrator.open_positions(),
        watched_pairs,
        timing: scheduler.timing_stats(),
    })
}

/// Store a completed bar.
async fn ingest_bar<O, S, C>(
    State(state): State<AppState<O, S, C>>,
    Path((symbol, timeframe)): Path<(String, String)>,
    Json(request): Json<IngestBarRequest>,
) -> Result<(StatusCode, Json<IngestBarResponse>), EngineError>
where
    O: OrderPlacementPort + 'static,
    S: StatePersistencePort + 'static,
    C: Clock,
{
    let symbol = Symbol::new(symbol);
    if !symbol.is_ticker() {
        return Err(EngineError::invalid_request(format!(
            "symbol '{symbol}' must be 1-10 uppercase letters"
        )));
    }
    let timeframe = Timeframe::from_str(&timeframe)
        .map_err(|e| EngineError::invalid_request(e.to_string()))?;

    let bar = Bar::from(request);
    let close_time = bar.close_time.as_datetime();
    let daily_close = state.orchestrator.scheduler().daily_close();
    if timeframe.last_boundary_at_or_before(close_time, daily_close) != close_time {
        return Err(EngineError::invalid_request(format!(
            "close_time {close_time} is not a {timeframe} boundary"
        ))
        .with_context("timeframe", timeframe.as_str()));
    }

    let stored_at = bar.close_time;
    state.bars.ingest(&symbol, timeframe, bar);
    tracing::debug!(symbol = %symbol, timeframe = %timeframe, close_time = %stored_at, "Bar ingested");

    Ok((
        StatusCode::CREATED,
        Json(IngestBarResponse {
            stored_bars: state.bars.len(&symbol, timeframe),
            symbol,
            timeframe,
            close_time: stored_at,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::InMemoryStatePersistence;
    use crate::application::ports::NoOpNotifier;
    use crate::application::services::{
        BarCloseScheduler, OrchestratorConfig, SchedulerConfig, SystemClock,
    };
    use crate::domain::risk_management::PortfolioRiskRegistry;
    use crate::domain::shared::Money;
    use crate::domain::trade_plan::{
        ExecutionFunctionSpec, FunctionType, NewTradePlan, RiskCategory,
    };
    use crate::infrastructure::broker::SimulatedOrderGateway;

    type TestState = AppState<SimulatedOrderGateway, InMemoryStatePersistence, SystemClock>;

    fn plan(id: &str) -> TradePlan {
        TradePlan::create(NewTradePlan {
            id: PlanId::new(id),
            symbol: Symbol::new("AAPL"),
            entry_level: dec!(180.50),
            stop_loss: dec!(178.00),
            take_profit: dec!(185.00),
            risk_category: RiskCategory::Normal,
            entry_function: ExecutionFunctionSpec::new(FunctionType::CloseAbove, Timeframe::OneMinute)
                .with_param("threshold", "180.50"),
            exit_function: ExecutionFunctionSpec::new(FunctionType::TrailingStop, Timeframe::OneMinute)
                .with_param("trail_percent", "1.5"),
        })
        .unwrap()
    }

    async fn state_with_plan() -> TestState {
        let shutdown = CancellationToken::new();
        let bars = Arc::new(InMemoryBarStore::new());
        let (scheduler, _events) = BarCloseScheduler::new(
            Arc::clone(&bars),
            Arc::new(SystemClock),
            SchedulerConfig::default(),
            shutdown.clone(),
        );
        let registry = Arc::new(
            PortfolioRiskRegistry::new(
                Money::new(dec!(10000)),
                PortfolioRiskRegistry::DEFAULT_LIMIT_PERCENT,
            )
            .unwrap(),
        );
        let orchestrator = TradeLifecycleOrchestrator::new(
            Arc::new(SimulatedOrderGateway::new(Arc::clone(&bars))),
            Arc::new(NoOpNotifier),
            Arc::new(InMemoryStatePersistence::new()),
            Arc::new(scheduler),
            registry,
            OrchestratorConfig::default(),
            shutdown,
        );
        orchestrator.activate(plan("AAPL_BREAKOUT")).await.unwrap();

        AppState {
            orchestrator,
            bars,
            mode: "PAPER".to_string(),
            version: "test".to_string(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(state_with_plan().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["mode"], "PAPER");
    }

    #[tokio::test]
    async fn test_list_and_get_plan() {
        let app = create_router(state_with_plan().await);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/plans").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["plans"][0]["id"], "AAPL_BREAKOUT");
        assert_eq!(body["plans"][0]["status"], "awaiting_entry");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/plans/NOPE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "PLAN_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cancel_then_cancel_again_conflicts() {
        let app = create_router(state_with_plan().await);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/plans/AAPL_BREAKOUT/cancel",
                &json!({ "reason": "setup invalidated" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["status_reason"], "setup invalidated");

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/plans/AAPL_BREAKOUT/cancel")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], "INVALID_PLAN_STATE");
    }

    #[tokio::test]
    async fn test_risk_reports_watched_pairs() {
        let app = create_router(state_with_plan().await);
        let response = app
            .oneshot(Request::builder().uri("/api/v1/risk").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["open_reservations"], 0);
        assert_eq!(body["watched_pairs"][0]["symbol"], "AAPL");
        assert_eq!(body["watched_pairs"][0]["timeframe"], "1min");
        assert_eq!(body["watched_pairs"][0]["subscribers"], 1);
    }

    #[tokio::test]
    async fn test_ingest_bar() {
        let state = state_with_plan().await;
        let bars = Arc::clone(&state.bars);
        let app = create_router(state);

        let bar = json!({
            "open": "180.40", "high": "181.00", "low": "180.30", "close": "180.75",
            "volume": 1200, "close_time": "2024-03-04T14:30:00Z"
        });
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/bars/AAPL/1min", &bar))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(bars.latest_close(&Symbol::new("AAPL")), Some(dec!(180.75)));

        let misaligned = json!({
            "open": "180.40", "high": "181.00", "low": "180.30", "close": "180.75",
            "volume": 1200, "close_time": "2024-03-04T14:30:30Z"
        });
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/bars/AAPL/1min", &misaligned))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json("/api/v1/bars/AAPL/2min", &bar))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_REQUEST");
    }
}
