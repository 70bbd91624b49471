pub mod group_executor;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /group_executor/execute_backend        start a background run (POST)
/// /group_executor/cancel                 cancel a running task (POST)
/// /group_executor/tasks                  list task snapshots
/// /group_executor/tasks/{id}             one task snapshot
/// /group_executor/configs                list, save presets
/// /group_executor/configs/{name}         get, delete preset
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/group_executor", group_executor::router())
}
