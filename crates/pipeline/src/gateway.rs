//! The orchestrator's view of the engine.
//!
//! [`EngineGateway`] is the seam between the worker loop and the engine:
//! submit a graph, poll a request, pull a pending request back out of
//! the queue, and raise the engine-wide interrupt. [`ComfyUIGateway`]
//! implements it over the ComfyUI REST API; tests substitute a fake.

use std::time::Duration;

use async_trait::async_trait;
use groupexec_comfyui::api::{ComfyUIApi, ComfyUIApiError, QueuePosition};
use groupexec_comfyui::bridge::EngineBridge;
use groupexec_core::graph::WorkGraph;
use serde::Serialize;

/// Best-effort snapshot of where a request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStatus {
    Queued,
    Running,
    /// Present in execution history.
    Completed,
    /// Neither queued nor in history. May mean "not visible yet" or
    /// "already evicted", so it is not proof of absence on its own.
    NotFound,
}

/// Why a submission did not produce a request id.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Submission rejected: {0}")]
    Invalid(String),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Submission timed out after {0:?}")]
    Timeout(Duration),
}

/// Identifies a submission as orchestrator-originated.
///
/// Stored with the queue item so it can be traced back from history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionTag {
    pub task_id: String,
    pub group: String,
    /// 1-based repeat index within the group.
    pub iteration: u32,
}

#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// Queue `graph` and return the request id the engine will report.
    async fn submit(&self, graph: &WorkGraph, tag: &SubmissionTag) -> Result<String, SubmitError>;

    async fn status(&self, request_id: &str) -> PromptStatus;

    /// Remove `request_id` from the pending queue. No-op once it started.
    async fn cancel_if_queued(&self, request_id: &str);

    /// Abort whatever the engine is executing right now.
    async fn raise_global_interrupt(&self);
}

// ---------------------------------------------------------------------------
// ComfyUI implementation
// ---------------------------------------------------------------------------

/// [`EngineGateway`] backed by the ComfyUI REST API.
pub struct ComfyUIGateway {
    api: ComfyUIApi,
    client_id: String,
    submit_timeout: Duration,
}

impl ComfyUIGateway {
    pub fn new(api: ComfyUIApi, client_id: impl Into<String>, submit_timeout: Duration) -> Self {
        Self {
            api,
            client_id: client_id.into(),
            submit_timeout,
        }
    }

    /// Share the bridge's API handle and client id, so execution events
    /// for submitted prompts arrive on the bridge's socket.
    pub fn from_bridge(bridge: &EngineBridge, submit_timeout: Duration) -> Self {
        Self::new(bridge.api().clone(), bridge.client_id(), submit_timeout)
    }

    fn classify(&self, err: ComfyUIApiError) -> SubmitError {
        if let Some(reason) = err.validation_reason() {
            SubmitError::Invalid(reason)
        } else if err.is_timeout() {
            SubmitError::Timeout(self.submit_timeout)
        } else {
            SubmitError::EngineUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl EngineGateway for ComfyUIGateway {
    async fn submit(&self, graph: &WorkGraph, tag: &SubmissionTag) -> Result<String, SubmitError> {
        let prompt_id = uuid::Uuid::new_v4().to_string();
        let extra_data = serde_json::json!({ "group_executor": tag });

        let request = self
            .api
            .submit_prompt(graph, &self.client_id, &prompt_id, &extra_data);
        let response = match tokio::time::timeout(self.submit_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.classify(e)),
            Err(_) => return Err(SubmitError::Timeout(self.submit_timeout)),
        };

        if response
            .node_errors
            .as_object()
            .is_some_and(|errors| !errors.is_empty())
        {
            tracing::warn!(
                prompt_id = %response.prompt_id,
                node_errors = %response.node_errors,
                "Prompt queued with node errors",
            );
        }

        Ok(response.prompt_id)
    }

    async fn status(&self, request_id: &str) -> PromptStatus {
        match self.api.is_in_history(request_id).await {
            Ok(true) => return PromptStatus::Completed,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(prompt_id = %request_id, error = %e, "History lookup failed");
                return PromptStatus::NotFound;
            }
        }

        match self.api.get_queue().await {
            Ok(queue) => match queue.position(request_id) {
                Some(QueuePosition::Running) => PromptStatus::Running,
                Some(QueuePosition::Pending) => PromptStatus::Queued,
                None => PromptStatus::NotFound,
            },
            Err(e) => {
                tracing::warn!(prompt_id = %request_id, error = %e, "Queue lookup failed");
                PromptStatus::NotFound
            }
        }
    }

    async fn cancel_if_queued(&self, request_id: &str) {
        if let Err(e) = self.api.delete_from_queue(&[request_id]).await {
            tracing::warn!(prompt_id = %request_id, error = %e, "Failed to remove prompt from queue");
        }
    }

    async fn raise_global_interrupt(&self) {
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(error = %e, "Failed to interrupt engine");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn gateway() -> ComfyUIGateway {
        ComfyUIGateway::new(
            ComfyUIApi::new("http://127.0.0.1:1".into()),
            "client",
            Duration::from_secs(1),
        )
    }

    #[test]
    fn bad_request_is_classified_invalid() {
        let err = ComfyUIApiError::ApiError {
            status: 400,
            body: r#"{"error":{"message":"Prompt outputs failed validation"}}"#.into(),
        };
        assert_matches!(gateway().classify(err), SubmitError::Invalid(reason) if reason == "Prompt outputs failed validation");
    }

    #[test]
    fn server_error_is_engine_unavailable() {
        let err = ComfyUIApiError::ApiError {
            status: 500,
            body: "boom".into(),
        };
        assert_matches!(gateway().classify(err), SubmitError::EngineUnavailable(_));
    }

    #[test]
    fn tag_serializes_into_extra_data() {
        let tag = SubmissionTag {
            task_id: "12".into(),
            group: "Upscale".into(),
            iteration: 2,
        };
        assert_eq!(
            serde_json::json!({ "group_executor": tag }),
            serde_json::json!({"group_executor": {"task_id": "12", "group": "Upscale", "iteration": 2}})
        );
    }

    #[tokio::test]
    async fn unreachable_engine_reports_not_found_and_unavailable() {
        let gateway = gateway();
        assert_eq!(gateway.status("p").await, PromptStatus::NotFound);

        let tag = SubmissionTag {
            task_id: "t".into(),
            group: "g".into(),
            iteration: 1,
        };
        let result = gateway.submit(&WorkGraph::new(), &tag).await;
        assert_matches!(result, Err(SubmitError::EngineUnavailable(_)));
    }
}
