//! Engine interrupt tracking.
//!
//! The engine's interrupt is global, so an interrupt raised by anyone
//! (a user in the editor, another task's cancel) may abort a prompt the
//! orchestrator is waiting on. [`InterruptWatcher`] subscribes to the
//! engine event stream, records interrupted request ids in the shared
//! [`InterruptedSet`], and cancels tasks per the [`InterruptPolicy`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use groupexec_comfyui::events::EngineEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::InterruptPolicy;
use crate::registry::TaskRegistry;

/// Request ids the engine reported as interrupted and no worker has
/// consumed yet.
#[derive(Debug, Default)]
pub struct InterruptedSet {
    ids: Mutex<HashSet<String>>,
}

impl InterruptedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, request_id: impl Into<String>) -> bool {
        self.lock().insert(request_id.into())
    }

    /// Remove `request_id`, returning whether it was present.
    pub fn take(&self, request_id: &str) -> bool {
        self.lock().remove(request_id)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.lock().contains(request_id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

pub struct InterruptWatcher {
    interrupted: Arc<InterruptedSet>,
    registry: Arc<TaskRegistry>,
    policy: InterruptPolicy,
}

impl InterruptWatcher {
    pub fn new(interrupted: Arc<InterruptedSet>, registry: Arc<TaskRegistry>, policy: InterruptPolicy) -> Self {
        Self {
            interrupted,
            registry,
            policy,
        }
    }

    /// Record an interrupted request and cancel affected tasks.
    ///
    /// Returns the number of tasks cancelled.
    pub fn on_interrupted(&self, request_id: &str) -> usize {
        self.interrupted.insert(request_id);

        let cancelled = match self.policy {
            InterruptPolicy::CancelAll => self.registry.cancel_all_running(),
            InterruptPolicy::OwnerOnly => usize::from(self.registry.cancel_owner_of(request_id).is_some()),
        };

        tracing::warn!(
            prompt_id = %request_id,
            policy = ?self.policy,
            cancelled,
            "Engine interrupt observed",
        );
        cancelled
    }

    /// Events were dropped; an interrupt may have been among them.
    pub fn on_missed_events(&self, skipped: u64) -> usize {
        tracing::warn!(skipped, "Engine events dropped by a lagging subscription");
        self.cancel_after_gap()
    }

    /// The socket dropped; interrupt frames sent until it reconnects are
    /// lost while the interrupted prompts still land in history.
    pub fn on_disconnected(&self) -> usize {
        tracing::warn!("Engine event stream disconnected");
        self.cancel_after_gap()
    }

    fn cancel_after_gap(&self) -> usize {
        match self.policy {
            InterruptPolicy::CancelAll => {
                let cancelled = self.registry.cancel_all_running();
                if cancelled > 0 {
                    tracing::warn!(cancelled, "Possible missed interrupt, cancelling running tasks");
                }
                cancelled
            }
            InterruptPolicy::OwnerOnly => 0,
        }
    }

    pub fn handle_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Interrupted { prompt_id } => {
                self.on_interrupted(prompt_id);
            }
            EngineEvent::Disconnected => {
                self.on_disconnected();
            }
            _ => {}
        }
    }

    /// Consume events until the channel closes or `cancel` fires.
    pub async fn run(self, mut rx: broadcast::Receiver<EngineEvent>, cancel: CancellationToken) {
        tracing::info!(policy = ?self.policy, "Interrupt watcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => self.handle_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.on_missed_events(skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("Interrupt watcher stopped");
    }

    pub fn spawn(self, rx: broadcast::Receiver<EngineEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(rx, cancel))
    }
}
