//! HTTP API for swaps, bridges, route status and health checks

use crate::bridge::{RouteExecutionStatus, StatusQuery, StatusReport};
use crate::chain::ChainManager;
use crate::config::ApiConfig;
use crate::engine::{BridgeRequest, BridgeResult, SwapEngine, SwapRequest, TransactionResult};
use crate::error::{EngineError, EngineResult, ErrorClass};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SwapEngine>,
    pub chain_manager: Arc<ChainManager>,
    pub started_at: Instant,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/routes", get(list_routes))
        .route("/routes/:id", get(get_route))
        .route("/status", get(get_status))
        .route("/swap", post(swap))
        .route("/bridge", post(bridge))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> EngineResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::Config(format!("Cannot bind API address {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| EngineError::Internal(format!("API server stopped: {}", e)))?;

    Ok(())
}

/// Engine error carried to the client with its class and resubmission hint
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    class: ErrorClass,
    /// Value may already be on the origin chain; do not resubmit
    origin_submitted: bool,
}

fn status_code(error: &EngineError) -> StatusCode {
    if error.origin_submitted() {
        return StatusCode::ACCEPTED;
    }
    match error.class() {
        ErrorClass::InvalidRequest | ErrorClass::UnknownSource => StatusCode::BAD_REQUEST,
        ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorClass::NetworkOrTimeout => StatusCode::BAD_GATEWAY,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.0.to_string(),
            class: self.0.class(),
            origin_submitted: self.0.origin_submitted(),
        };
        (status_code(&self.0), Json(body)).into_response()
    }
}

/// Health check endpoint - basic liveness
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        sources: state.engine.source_ids(),
    })
}

/// Readiness check - every configured chain answers
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let details: Vec<ChainHealth> = state
        .chain_manager
        .health_check()
        .await
        .into_iter()
        .map(|(chain_id, healthy)| ChainHealth { chain_id, healthy })
        .collect();
    let ready = details.iter().all(|c| c.healthy);
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(ReadinessResponse { ready, details }))
}

async fn list_routes(State(state): State<AppState>) -> Json<Vec<RouteExecutionStatus>> {
    Json(state.engine.active_routes())
}

async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RouteExecutionStatus>, StatusCode> {
    state
        .engine
        .route_status(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.engine.get_status(&query).await?))
}

async fn swap(
    State(state): State<AppState>,
    Json(request): Json<SwapRequest>,
) -> Result<Json<TransactionResult>, ApiError> {
    Ok(Json(state.engine.swap(request).await?))
}

/// Blocks until the destination settles. Supply `route_id` to watch the
/// transfer on `/routes/:id` meanwhile; `/routes` lists every route in flight.
async fn bridge(
    State(state): State<AppState>,
    Json(request): Json<BridgeRequest>,
) -> Result<Json<BridgeResult>, ApiError> {
    Ok(Json(state.engine.bridge(request, None).await?))
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    sources: Vec<String>,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    details: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain_id: u64,
    healthy: bool,
}
