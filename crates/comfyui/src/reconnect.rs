//! Exponential-backoff reconnection for the ComfyUI event socket.
//!
//! [`reconnect_loop`] keeps retrying [`ComfyUIClient::connect`] with
//! growing pauses until a connection succeeds, the optional attempt
//! budget runs out, or the [`CancellationToken`] fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, ComfyUIConnection};

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Pause after the first failed attempt.
    pub initial_delay: Duration,
    /// Ceiling for the pause between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after each failure.
    pub multiplier: f64,
    /// Give up after this many attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Pause that follows `current`, clamped to [`max_delay`](Self::max_delay).
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Reconnect with exponential backoff.
///
/// Returns `Some(connection)` on success and `None` when cancelled or
/// when the attempt budget is exhausted.
pub async fn reconnect_loop(
    client: &ComfyUIClient,
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
) -> Option<ComfyUIConnection> {
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return None;
        }

        attempt += 1;
        tracing::info!(
            ws_url = client.ws_url(),
            attempt,
            "Reconnecting to ComfyUI",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(ws_url = client.ws_url(), "Reconnect cancelled");
                return None;
            }
            result = client.connect() => {
                match result {
                    Ok(conn) => {
                        tracing::info!(ws_url = client.ws_url(), attempt, "Reconnected to ComfyUI");
                        return Some(conn);
                    }
                    Err(e) => {
                        tracing::warn!(
                            ws_url = client.ws_url(),
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Reconnect attempt {attempt} failed",
                        );
                    }
                }
            }
        }

        if policy.exhausted(attempt) {
            tracing::error!(ws_url = client.ws_url(), attempt, "Giving up on ComfyUI reconnect");
            return None;
        }

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = policy.next_delay(delay);
    }
}
