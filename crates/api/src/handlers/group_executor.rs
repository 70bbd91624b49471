//! Handlers for starting, cancelling and inspecting background runs.
//!
//! The editor identifies a run by the id of the node that launched it,
//! sent as `node_id` (a number or a string).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use groupexec_core::graph::WorkGraph;
use groupexec_core::plan::ExecutionPlan;
use groupexec_pipeline::error::OrchestratorError;
use serde::{Deserialize, Deserializer};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /group_executor/execute_backend`.
#[derive(Debug, Deserialize)]
pub struct ExecuteBackendRequest {
    #[serde(default, deserialize_with = "deserialize_task_id")]
    pub node_id: Option<String>,
    #[serde(default)]
    pub execution_list: Option<ExecutionPlan>,
    #[serde(default)]
    pub api_prompt: Option<WorkGraph>,
}

/// Body of `POST /group_executor/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default, deserialize_with = "deserialize_task_id")]
    pub node_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTaskId {
    Text(String),
    Number(i64),
}

fn deserialize_task_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawTaskId> = Option::deserialize(deserializer)?;
    Ok(raw.map(|id| match id {
        RawTaskId::Text(s) => s,
        RawTaskId::Number(n) => n.to_string(),
    }))
}

/// POST /api/v1/group_executor/execute_backend
///
/// Start a background run. Returns 202 with the new task snapshot,
/// 400 for a missing id, empty plan or missing graph, and 409 when a
/// run under the same id is still going.
pub async fn execute_backend(
    State(state): State<AppState>,
    Json(input): Json<ExecuteBackendRequest>,
) -> AppResult<impl IntoResponse> {
    let task_id = input.node_id.ok_or(OrchestratorError::MissingTaskId)?;
    let plan = input.execution_list.unwrap_or_default();
    let graph = input.api_prompt.unwrap_or_default();

    let snapshot = state.orchestrator.start(&task_id, plan, graph)?;

    tracing::info!(task_id = %snapshot.task_id, "Background run accepted");

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: snapshot })))
}

/// POST /api/v1/group_executor/cancel
///
/// Cancel a running task. 404 when nothing is running under the id.
pub async fn cancel(
    State(state): State<AppState>,
    Json(input): Json<CancelRequest>,
) -> AppResult<impl IntoResponse> {
    let task_id = input.node_id.ok_or(OrchestratorError::MissingTaskId)?;

    state.orchestrator.cancel(&task_id).await?;

    let snapshot = state
        .orchestrator
        .status(&task_id)
        .ok_or_else(|| OrchestratorError::NotFound(task_id.clone()))?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/group_executor/tasks
pub async fn list_tasks(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.orchestrator.tasks(),
    }))
}

/// GET /api/v1/group_executor/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .orchestrator
        .status(&task_id)
        .ok_or(OrchestratorError::NotFound(task_id))?;
    Ok(Json(DataResponse { data: snapshot }))
}
