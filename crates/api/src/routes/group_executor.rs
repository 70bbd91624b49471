use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{group_executor, presets};
use crate::state::AppState;

/// Routes mounted at `/group_executor`.
///
/// ```text
/// POST   /execute_backend  -> execute_backend
/// POST   /cancel           -> cancel
/// GET    /tasks            -> list_tasks
/// GET    /tasks/{id}       -> get_task
/// GET    /configs          -> list_presets
/// POST   /configs          -> save_preset
/// GET    /configs/{name}   -> get_preset
/// DELETE /configs/{name}   -> delete_preset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/execute_backend", post(group_executor::execute_backend))
        .route("/cancel", post(group_executor::cancel))
        .route("/tasks", get(group_executor::list_tasks))
        .route("/tasks/{id}", get(group_executor::get_task))
        .route("/configs", get(presets::list_presets).post(presets::save_preset))
        .route(
            "/configs/{name}",
            get(presets::get_preset).delete(presets::delete_preset),
        )
}
