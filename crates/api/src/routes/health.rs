use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the engine event socket is up.
    pub engine_connected: bool,
    /// Orchestration tasks currently running.
    pub running_tasks: usize,
}

/// GET /health -- returns service and engine connectivity.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine_connected = state.bridge.as_ref().is_some_and(|b| b.is_connected());

    let status = if engine_connected { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        engine_connected,
        running_tasks: state.orchestrator.registry().running_count(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
