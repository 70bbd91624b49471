//! Long-lived bridge to a single ComfyUI instance.
//!
//! [`EngineBridge`] owns the REST client and a background task that
//! keeps the event socket alive (connect -> process -> reconnect).
//! Engine events are fanned out over a [`tokio::sync::broadcast`]
//! channel; [`EngineBridge::subscribe`] is the subscription point for
//! anything that needs to react to them, such as the interrupt watcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;
use crate::client::{ComfyUIClient, ComfyUIConnection};
use crate::events::EngineEvent;
use crate::processor::process_messages;
use crate::reconnect::{reconnect_loop, BackoffPolicy};

/// Broadcast channel capacity for engine events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`EngineBridge::shutdown`] waits for the connection task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where to reach the engine and how to reconnect.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// HTTP base URL, e.g. `http://127.0.0.1:8188`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://127.0.0.1:8188`.
    pub ws_url: String,
    pub backoff: BackoffPolicy,
}

/// Shared handle to one engine instance.
///
/// Created once at startup via [`EngineBridge::start`]; the returned
/// `Arc` can be cloned into whatever needs the API or the event stream.
pub struct EngineBridge {
    api: ComfyUIApi,
    client_id: String,
    event_tx: broadcast::Sender<EngineEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EngineBridge {
    /// Spawn the connection task and return the shared handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: BridgeConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));
        let client = ComfyUIClient::new(config.ws_url.clone());
        let client_id = client.client_id().to_string();

        let task_handle = {
            let event_tx = event_tx.clone();
            let connected = Arc::clone(&connected);
            let cancel = cancel.clone();
            let backoff = config.backoff.clone();
            tokio::spawn(async move {
                tracing::info!(ws_url = client.ws_url(), "Starting ComfyUI connection task");
                run_connection_loop(&client, &backoff, &event_tx, &connected, &cancel).await;
                tracing::info!("ComfyUI connection task exited");
            })
        };

        Arc::new(Self {
            api: ComfyUIApi::new(config.api_url),
            client_id,
            event_tx,
            connected,
            cancel,
            task_handle: Mutex::new(Some(task_handle)),
        })
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// REST client for this instance.
    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    /// Client id used on the socket; prompts submitted with it are
    /// reported back on this connection.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the event socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Stop the connection task, waiting briefly for a clean exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down ComfyUI bridge");
        self.cancel.cancel();

        let handle = self
            .task_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
        }

        tracing::info!("ComfyUI bridge shut down");
    }
}

/// Connect -> process messages -> reconnect, until cancelled.
async fn run_connection_loop(
    client: &ComfyUIClient,
    backoff: &BackoffPolicy,
    event_tx: &broadcast::Sender<EngineEvent>,
    connected: &AtomicBool,
    cancel: &CancellationToken,
) {
    let mut next: Option<ComfyUIConnection> = None;

    loop {
        let conn = match next.take() {
            Some(conn) => conn,
            None => match client.connect().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Connection failed, entering reconnect loop");
                    match reconnect_loop(client, backoff, cancel).await {
                        Some(conn) => conn,
                        None => return,
                    }
                }
            },
        };

        connected.store(true, Ordering::Relaxed);
        let _ = event_tx.send(EngineEvent::Connected);

        let mut ws_stream = conn.ws_stream;
        process_messages(&mut ws_stream, event_tx, cancel).await;

        connected.store(false, Ordering::Relaxed);
        let _ = event_tx.send(EngineEvent::Disconnected);

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!("Connection lost, entering reconnect loop");
        match reconnect_loop(client, backoff, cancel).await {
            Some(conn) => next = Some(conn),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> BridgeConfig {
        BridgeConfig {
            api_url: "http://127.0.0.1:1".into(),
            ws_url: "ws://127.0.0.1:1".into(),
            backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(10),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn starts_disconnected_and_shuts_down_cleanly() {
        let bridge = EngineBridge::start(unreachable_config());
        assert!(!bridge.is_connected());
        assert!(!bridge.client_id().is_empty());
        assert_eq!(bridge.api().api_url(), "http://127.0.0.1:1");

        bridge.shutdown().await;
        assert!(bridge.task_handle.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribers_receive_broadcast_events() {
        let bridge = EngineBridge::start(unreachable_config());
        let mut rx = bridge.subscribe();

        bridge
            .event_tx
            .send(EngineEvent::Interrupted {
                prompt_id: "p".into(),
            })
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::Interrupted {
                prompt_id: "p".into()
            }
        );
        bridge.shutdown().await;
    }
}
