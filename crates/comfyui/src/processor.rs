//! WebSocket message processing loop.
//!
//! Reads raw frames from a ComfyUI WebSocket connection, parses them
//! into typed [`ComfyUIMessage`] variants and forwards the ones that
//! matter as [`EngineEvent`]s on the broadcast channel.

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::ComfyUIStream;
use crate::events::EngineEvent;
use crate::messages::{parse_message, ComfyUIMessage};

/// Process WebSocket messages until the socket closes, a receive error
/// occurs, or `cancel` fires.
///
/// Binary frames (preview images) are ignored.
pub async fn process_messages(
    ws_stream: &mut ComfyUIStream,
    event_tx: &broadcast::Sender<EngineEvent>,
    cancel: &CancellationToken,
) {
    loop {
        let msg_result = tokio::select! {
            _ = cancel.cancelled() => break,
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
        };

        match msg_result {
            Ok(Message::Text(text)) => handle_text_message(&text, event_tx),
            Ok(Message::Binary(_)) => {
                tracing::trace!("Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "ComfyUI WebSocket closed");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}

fn handle_text_message(text: &str, event_tx: &broadcast::Sender<EngineEvent>) {
    match parse_message(text) {
        Ok(msg) => {
            if let Some(event) = translate(&msg) {
                // A send error only means nobody is subscribed.
                let _ = event_tx.send(event);
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
        }
    }
}

/// Map a parsed message to the engine event it implies, if any.
pub fn translate(msg: &ComfyUIMessage) -> Option<EngineEvent> {
    match msg {
        ComfyUIMessage::ExecutionStart(data) => {
            tracing::info!(prompt_id = %data.prompt_id, "Execution started");
            Some(EngineEvent::ExecutionStarted {
                prompt_id: data.prompt_id.clone(),
            })
        }
        ComfyUIMessage::ExecutionSuccess(data) => {
            tracing::info!(prompt_id = %data.prompt_id, "Execution completed");
            Some(EngineEvent::ExecutionCompleted {
                prompt_id: data.prompt_id.clone(),
            })
        }
        ComfyUIMessage::ExecutionInterrupted(data) => {
            tracing::warn!(
                prompt_id = %data.prompt_id,
                node_id = ?data.node_id,
                node_type = ?data.node_type,
                "Execution interrupted",
            );
            Some(EngineEvent::Interrupted {
                prompt_id: data.prompt_id.clone(),
            })
        }
        ComfyUIMessage::ExecutionError(data) => {
            tracing::error!(
                prompt_id = %data.prompt_id,
                node_id = ?data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error",
            );
            Some(EngineEvent::ExecutionFailed {
                prompt_id: data.prompt_id.clone(),
                error: data.exception_message.clone(),
            })
        }
        ComfyUIMessage::Executing(data) => {
            tracing::trace!(node = ?data.node, prompt_id = ?data.prompt_id, "Executing");
            None
        }
        ComfyUIMessage::Progress(data) => {
            tracing::trace!(value = data.value, max = data.max, "Progress");
            None
        }
        ComfyUIMessage::Executed(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, node = %data.node, "Node executed");
            None
        }
        ComfyUIMessage::ExecutionCached(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, cached = data.nodes.len(), "Execution used cache");
            None
        }
        ComfyUIMessage::Status(data) => {
            tracing::debug!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
            None
        }
    }
}
