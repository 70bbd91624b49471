//! Engine events emitted by the ComfyUI bridge.
//!
//! These are the high-level state changes the orchestrator cares about,
//! produced by [`processor`](crate::processor) after interpreting raw
//! WebSocket messages.

use serde::Serialize;

/// A lifecycle event originating from the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The WebSocket connection was established.
    Connected,

    /// The WebSocket connection was lost.
    Disconnected,

    /// A prompt started executing.
    ExecutionStarted { prompt_id: String },

    /// A prompt ran to completion.
    ExecutionCompleted { prompt_id: String },

    /// A prompt was aborted by an interrupt.
    Interrupted { prompt_id: String },

    /// A prompt failed with an error.
    ExecutionFailed { prompt_id: String, error: String },
}

impl EngineEvent {
    /// The prompt this event concerns, if any.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            EngineEvent::Connected | EngineEvent::Disconnected => None,
            EngineEvent::ExecutionStarted { prompt_id }
            | EngineEvent::ExecutionCompleted { prompt_id }
            | EngineEvent::Interrupted { prompt_id }
            | EngineEvent::ExecutionFailed { prompt_id, .. } => Some(prompt_id),
        }
    }
}
