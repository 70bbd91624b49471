//! Typed ComfyUI socket frames.
//!
//! Every text frame is `{"type": "<kind>", "data": {...}}`. Only the
//! kinds below are modelled; anything else (custom node chatter, monitor
//! plugins) fails to parse and is dropped by the processor.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ComfyUIMessage {
    /// Queue depth broadcast.
    Status(StatusData),
    ExecutionStart(PromptRef),
    /// Nodes served from cache for this prompt.
    ExecutionCached(ExecutionCachedData),
    /// Current node; `node: None` marks the end of the prompt.
    Executing(ExecutingData),
    Progress(ProgressData),
    /// A node produced output.
    Executed(ExecutedData),
    ExecutionSuccess(PromptRef),
    /// The prompt was aborted by `POST /interrupt`.
    ExecutionInterrupted(InterruptedData),
    ExecutionError(ErrorData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: u32,
    pub max: u32,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptedData {
    pub prompt_id: String,
    /// Node that was running when the interrupt landed.
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    /// Nodes that had already finished.
    #[serde(default)]
    pub executed: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_type: String,
    #[serde(default)]
    pub exception_message: String,
}

/// Parse one text frame. Unknown kinds and malformed JSON are errors.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
