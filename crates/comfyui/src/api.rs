//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps prompt submission, queue inspection and deletion, history
//! lookup and the engine-wide interrupt using [`reqwest`].

use groupexec_core::graph::WorkGraph;
use serde::{Deserialize, Serialize};

/// HTTP client for a single ComfyUI instance.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of a `POST /prompt` request.
#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    prompt: &'a WorkGraph,
    client_id: &'a str,
    prompt_id: &'a str,
    extra_data: &'a serde_json::Value,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    pub number: i64,
    /// Per-node validation problems that did not block queuing.
    #[serde(default)]
    pub node_errors: serde_json::Value,
}

/// Where a prompt currently sits in the engine's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    Running,
    Pending,
}

/// Snapshot of `GET /queue`.
///
/// Each item is an array whose second element is the prompt id:
/// `[number, prompt_id, prompt, extra_data, outputs_to_execute]`.
#[derive(Debug, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<serde_json::Value>,
    #[serde(default)]
    pub queue_pending: Vec<serde_json::Value>,
}

impl QueueSnapshot {
    /// Locate a prompt in the running or pending lists.
    pub fn position(&self, prompt_id: &str) -> Option<QueuePosition> {
        let holds = |items: &[serde_json::Value]| {
            items
                .iter()
                .any(|item| item.get(1).and_then(serde_json::Value::as_str) == Some(prompt_id))
        };
        if holds(self.queue_running.as_slice()) {
            Some(QueuePosition::Running)
        } else if holds(self.queue_pending.as_slice()) {
            Some(QueuePosition::Pending)
        } else {
            None
        }
    }
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApiError {
    /// Human-readable reason when ComfyUI rejected a prompt as invalid.
    ///
    /// ComfyUI answers an invalid prompt with `400` and a body of the form
    /// `{"error": {"message": ..}, "node_errors": {..}}`. Returns `None`
    /// for every other failure.
    pub fn validation_reason(&self) -> Option<String> {
        match self {
            ComfyUIApiError::ApiError { status: 400, body } => {
                let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
                let message = parsed.as_ref().and_then(|v| {
                    v.pointer("/error/message")
                        .or_else(|| v.get("error"))
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string)
                });
                Some(message.unwrap_or_else(|| body.clone()))
            }
            _ => None,
        }
    }

    /// Whether the failure was a client-side request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ComfyUIApiError::Request(e) if e.is_timeout())
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Queue a prompt for execution.
    ///
    /// `prompt_id` is chosen by the caller so the id is known before the
    /// engine answers. `extra_data` is stored with the queue item and
    /// echoed back in history.
    pub async fn submit_prompt(
        &self,
        prompt: &WorkGraph,
        client_id: &str,
        prompt_id: &str,
        extra_data: &serde_json::Value,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = PromptRequest {
            prompt,
            client_id,
            prompt_id,
            extra_data,
        };

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the running and pending queue lists.
    pub async fn get_queue(&self) -> Result<QueueSnapshot, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// ComfyUI answers `{}` for prompts it has no history for, and
    /// `{"<prompt_id>": {...}}` once the prompt has finished.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Whether the prompt has an entry in execution history.
    pub async fn is_in_history(&self, prompt_id: &str) -> Result<bool, ComfyUIApiError> {
        let history = self.get_history(prompt_id).await?;
        Ok(history.get(prompt_id).is_some())
    }

    /// Remove prompts from the pending queue.
    ///
    /// Sends `POST /queue {"delete": [..]}`. Prompts that already started
    /// are unaffected.
    pub async fn delete_from_queue(&self, prompt_ids: &[&str]) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": prompt_ids,
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Interrupt the currently running execution immediately.
    ///
    /// Sends a `POST /interrupt` request.  This does not target a
    /// specific prompt -- it interrupts whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn queue_snapshot_locates_running_and_pending() {
        let snapshot: QueueSnapshot = serde_json::from_value(json!({
            "queue_running": [[4, "run-1", {}, {}, ["9"]]],
            "queue_pending": [[5, "wait-1", {}, {}, ["9"]], [6, "wait-2", {}, {}, ["9"]]]
        }))
        .unwrap();

        assert_eq!(snapshot.position("run-1"), Some(QueuePosition::Running));
        assert_eq!(snapshot.position("wait-2"), Some(QueuePosition::Pending));
        assert_eq!(snapshot.position("gone"), None);
    }

    #[test]
    fn queue_snapshot_tolerates_missing_lists() {
        let snapshot: QueueSnapshot = serde_json::from_value(json!({})).unwrap();
        assert_eq!(snapshot.position("x"), None);
    }

    #[test]
    fn validation_reason_reads_error_message() {
        let err = ComfyUIApiError::ApiError {
            status: 400,
            body: r#"{"error":{"type":"prompt_outputs_failed_validation","message":"Prompt outputs failed validation"},"node_errors":{}}"#.into(),
        };
        assert_eq!(
            err.validation_reason().as_deref(),
            Some("Prompt outputs failed validation")
        );
    }

    #[test]
    fn validation_reason_falls_back_to_body() {
        let err = ComfyUIApiError::ApiError {
            status: 400,
            body: "bad prompt".into(),
        };
        assert_eq!(err.validation_reason().as_deref(), Some("bad prompt"));
    }

    #[test]
    fn server_errors_are_not_validation_failures() {
        let err = ComfyUIApiError::ApiError {
            status: 500,
            body: "{}".into(),
        };
        assert!(err.validation_reason().is_none());
        assert!(!err.is_timeout());
    }

    #[test]
    fn prompt_request_serializes_graph_inline() {
        let mut graph = WorkGraph::new();
        graph.insert("1", groupexec_core::graph::WorkNode::new("SaveImage"));
        let extra = json!({"group_executor": {"task_id": "t"}});
        let body = serde_json::to_value(PromptRequest {
            prompt: &graph,
            client_id: "c",
            prompt_id: "p",
            extra_data: &extra,
        })
        .unwrap();

        assert_eq!(body["prompt"]["1"]["class_type"], "SaveImage");
        assert_eq!(body["prompt_id"], "p");
        assert_eq!(body["extra_data"]["group_executor"]["task_id"], "t");
    }
}
