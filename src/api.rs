//! REST API for the orchestrator
//!
//! Serves the latest artifacts and aggregate report, triggers runs and
//! clears the cache. Every response uses the `ApiResponse` envelope.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::OrchestrationError;
use crate::orchestrator::{JobOrchestrator, RunOptions};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    /// Dashboards to run; all when absent or empty.
    #[serde(default)]
    pub dashboards: Option<Vec<String>>,
    #[serde(default)]
    pub no_ai: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default)]
    pub prefix: Option<String>,
}

/// =============================
/// Response Envelope
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> Reply {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn failure(error: OrchestrationError) -> Reply {
    (status_for(&error), Json(ApiResponse::error(error.to_string())))
}

fn not_found(message: String) -> Reply {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error(message)))
}

fn status_for(error: &OrchestrationError) -> StatusCode {
    match error {
        OrchestrationError::JobError(_) => StatusCode::CONFLICT,
        OrchestrationError::ConfigError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<JobOrchestrator>,
}

/// =============================
/// Handlers
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "running": state.orchestrator.is_running(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_dashboards(State(state): State<ApiState>) -> Reply {
    match state.orchestrator.store().dashboards().await {
        Ok(available) => ok(serde_json::json!({
            "configured": state.orchestrator.dashboards(),
            "available": available,
        })),
        Err(e) => failure(e),
    }
}

async fn get_dashboard(State(state): State<ApiState>, Path(id): Path<String>) -> Reply {
    match state.orchestrator.store().latest_artifact(&id).await {
        Ok(Some(artifact)) => ok(artifact),
        Ok(None) => not_found(format!("no artifact for dashboard {}", id)),
        Err(e) => failure(e),
    }
}

async fn get_report(State(state): State<ApiState>) -> Reply {
    match state.orchestrator.store().latest_report().await {
        Ok(Some(report)) => ok(report),
        Ok(None) => not_found("no aggregate report yet".to_string()),
        Err(e) => failure(e),
    }
}

async fn run(State(state): State<ApiState>, body: Option<Json<RunRequest>>) -> Reply {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let options = RunOptions {
        only: request.dashboards.unwrap_or_default(),
        disable_ai: request.no_ai.unwrap_or(false),
    };
    info!(only = ?options.only, disable_ai = options.disable_ai, "Run requested over HTTP");

    match state.orchestrator.run(options).await {
        Ok(summary) => ok(summary),
        Err(e) => failure(e),
    }
}

async fn clear_cache(
    State(state): State<ApiState>,
    body: Option<Json<ClearCacheRequest>>,
) -> Reply {
    let prefix = body.and_then(|Json(r)| r.prefix);
    let cache = state.orchestrator.cache();
    let removed = cache.clear(prefix.as_deref());
    ok(serde_json::json!({
        "removed": removed,
        "remaining": cache.len(),
        "prefix": prefix,
    }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<JobOrchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/dashboards", get(list_dashboards))
        .route("/api/dashboards/:id", get(get_dashboard))
        .route("/api/report", get(get_report))
        .route("/api/run", post(run))
        .route("/api/cache/clear", post(clear_cache))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<JobOrchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
