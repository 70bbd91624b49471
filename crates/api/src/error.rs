use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use groupexec_core::error::CoreError;
use groupexec_pipeline::error::OrchestratorError;
use serde_json::json;

/// Error type returned by every handler.
///
/// Rendered as `{"error": <message>, "code": <CODE>}`. Internal failures
/// are logged and replaced by a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Rejections from starting, cancelling or looking up a task.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No route matched the request path.
    #[error("No route for {0}")]
    RouteNotFound(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// HTTP status and machine-readable code.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Core(CoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Core(CoreError::Validation(_)) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Core(CoreError::Internal(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            AppError::Orchestrator(err) => match err {
                OrchestratorError::AlreadyRunning(_) => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
                OrchestratorError::MissingTaskId => (StatusCode::BAD_REQUEST, "MISSING_TASK_ID"),
                OrchestratorError::EmptyPlan => (StatusCode::BAD_REQUEST, "EMPTY_PLAN"),
                OrchestratorError::MissingGraph => (StatusCode::BAD_REQUEST, "MISSING_GRAPH"),
                OrchestratorError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            },
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::RouteNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Core(CoreError::NotFound { entity, id }) => format!("{entity} '{id}' not found"),
            AppError::Core(CoreError::Validation(msg)) | AppError::BadRequest(msg) => msg.clone(),
            AppError::Core(CoreError::Internal(detail)) => {
                tracing::error!(error = %detail, "Internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        let body = json!({ "error": self.public_message(), "code": code });
        (status, axum::Json(body)).into_response()
    }
}
