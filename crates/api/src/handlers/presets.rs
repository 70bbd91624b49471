//! Handlers for saved plan presets.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::presets::PresetSummary;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SavedPreset {
    pub name: String,
}

/// GET /api/v1/group_executor/configs
pub async fn list_presets(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let presets: Vec<PresetSummary> = state.presets.list().await?;
    Ok(Json(DataResponse { data: presets }))
}

/// POST /api/v1/group_executor/configs
///
/// Body is any JSON object with a `name`; the whole object is stored.
pub async fn save_preset(
    State(state): State<AppState>,
    Json(document): Json<serde_json::Value>,
) -> AppResult<impl IntoResponse> {
    let name = document
        .get("name")
        .and_then(serde_json::Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Preset name must not be empty".to_string()))?;

    let name = state.presets.save(name, &document).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: SavedPreset { name } })))
}

/// GET /api/v1/group_executor/configs/{name}
pub async fn get_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let document = state.presets.load(&name).await?;
    Ok(Json(DataResponse { data: document }))
}

/// DELETE /api/v1/group_executor/configs/{name}
pub async fn delete_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.presets.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
