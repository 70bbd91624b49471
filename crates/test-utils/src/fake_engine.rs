use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use groupexec_comfyui::events::EngineEvent;
use groupexec_core::graph::WorkGraph;
use groupexec_pipeline::gateway::{EngineGateway, PromptStatus, SubmissionTag, SubmitError};
use groupexec_pipeline::interrupts::InterruptedSet;
use tokio::sync::broadcast;

/// How submitted prompts progress when polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Report `Completed` on the n-th status poll.
    AfterPolls(u32),
    /// Stay `Running` until completed, interrupted or dequeued.
    Hold,
}

/// One accepted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub request_id: String,
    pub tag: SubmissionTag,
    pub graph: WorkGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptState {
    Queued,
    Running,
    Completed,
    Dequeued,
}

#[derive(Debug)]
struct FakePrompt {
    state: PromptState,
    polls: u32,
}

#[derive(Default)]
struct FakeState {
    submissions: Vec<Submission>,
    prompts: HashMap<String, FakePrompt>,
    submit_failures: VecDeque<SubmitError>,
    interrupts: u32,
    dequeue_requests: Vec<String>,
    next_id: u64,
    late_interrupt: Option<(String, Arc<InterruptedSet>)>,
}

/// In-memory [`EngineGateway`].
///
/// Records every call and emits [`EngineEvent`]s on its own broadcast
/// channel, so an interrupt watcher can be wired to it exactly as to the
/// real bridge.
pub struct FakeEngine {
    mode: CompletionMode,
    state: Mutex<FakeState>,
    events: broadcast::Sender<EngineEvent>,
}

impl FakeEngine {
    pub fn new(mode: CompletionMode) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            mode,
            state: Mutex::new(FakeState::default()),
            events,
        })
    }

    /// Prompts complete on their first status poll.
    pub fn instant() -> Arc<Self> {
        Self::new(CompletionMode::AfterPolls(1))
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Make the next `submit` call fail with `error`.
    pub fn fail_next_submit(&self, error: SubmitError) {
        self.lock().submit_failures.push_back(error);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    pub fn interrupt_count(&self) -> u32 {
        self.lock().interrupts
    }

    /// Request ids passed to `cancel_if_queued`.
    pub fn dequeue_requests(&self) -> Vec<String> {
        self.lock().dequeue_requests.clone()
    }

    /// Request ids currently queued or running.
    pub fn active_request_ids(&self) -> Vec<String> {
        let state = self.lock();
        state
            .submissions
            .iter()
            .filter(|s| {
                state
                    .prompts
                    .get(&s.request_id)
                    .is_some_and(|p| matches!(p.state, PromptState::Queued | PromptState::Running))
            })
            .map(|s| s.request_id.clone())
            .collect()
    }

    /// Move a held prompt into history.
    pub fn complete(&self, request_id: &str) {
        if let Some(prompt) = self.lock().prompts.get_mut(request_id) {
            prompt.state = PromptState::Completed;
        }
    }

    /// Forget a prompt entirely, as when history is cleared.
    pub fn evict(&self, request_id: &str) {
        self.lock().prompts.remove(request_id);
    }

    /// Record `request_id` as interrupted from inside the `status` call
    /// that first reports it `Completed` or `NotFound`, after the worker's
    /// pre-poll check has already run.
    pub fn interrupt_on_resolve(&self, request_id: &str, interrupted: Arc<InterruptedSet>) {
        self.lock().late_interrupt = Some((request_id.to_string(), interrupted));
    }

    /// Emit `Disconnected`, as the bridge does when the socket drops.
    pub fn emit_disconnect(&self) {
        let _ = self.events.send(EngineEvent::Disconnected);
    }

    /// Emit an interrupt event for `request_id` without touching its state,
    /// as when someone else hits "stop" in the editor.
    pub fn emit_interrupt(&self, request_id: &str) {
        let _ = self.events.send(EngineEvent::Interrupted {
            prompt_id: request_id.to_string(),
        });
    }
}

#[async_trait]
impl EngineGateway for FakeEngine {
    async fn submit(&self, graph: &WorkGraph, tag: &SubmissionTag) -> Result<String, SubmitError> {
        let mut state = self.lock();
        if let Some(error) = state.submit_failures.pop_front() {
            return Err(error);
        }

        state.next_id += 1;
        let request_id = format!("fake-{}", state.next_id);
        state.prompts.insert(
            request_id.clone(),
            FakePrompt {
                state: PromptState::Queued,
                polls: 0,
            },
        );
        state.submissions.push(Submission {
            request_id: request_id.clone(),
            tag: tag.clone(),
            graph: graph.clone(),
        });
        Ok(request_id)
    }

    async fn status(&self, request_id: &str) -> PromptStatus {
        let mut state = self.lock();
        let status = match state.prompts.get_mut(request_id) {
            None => PromptStatus::NotFound,
            Some(prompt) => match prompt.state {
                PromptState::Completed => PromptStatus::Completed,
                PromptState::Dequeued => PromptStatus::NotFound,
                PromptState::Queued | PromptState::Running => {
                    prompt.polls += 1;
                    prompt.state = PromptState::Running;
                    match self.mode {
                        CompletionMode::AfterPolls(n) if prompt.polls >= n => {
                            prompt.state = PromptState::Completed;
                            PromptStatus::Completed
                        }
                        _ => PromptStatus::Running,
                    }
                }
            },
        };

        let resolved = matches!(status, PromptStatus::Completed | PromptStatus::NotFound);
        if resolved && state.late_interrupt.as_ref().is_some_and(|(id, _)| id == request_id) {
            if let Some((id, interrupted)) = state.late_interrupt.take() {
                interrupted.insert(id);
            }
        }
        status
    }

    async fn cancel_if_queued(&self, request_id: &str) {
        let mut state = self.lock();
        state.dequeue_requests.push(request_id.to_string());
        if let Some(prompt) = state.prompts.get_mut(request_id) {
            if prompt.state == PromptState::Queued {
                prompt.state = PromptState::Dequeued;
            }
        }
    }

    /// Interrupted prompts land in history, and the engine reports each
    /// one on the event stream first.
    async fn raise_global_interrupt(&self) {
        let mut state = self.lock();
        state.interrupts += 1;

        let running: Vec<String> = state
            .prompts
            .iter()
            .filter(|(_, p)| p.state == PromptState::Running)
            .map(|(id, _)| id.clone())
            .collect();
        for id in running {
            let _ = self.events.send(EngineEvent::Interrupted { prompt_id: id.clone() });
            if let Some(prompt) = state.prompts.get_mut(&id) {
                prompt.state = PromptState::Completed;
            }
        }
    }
}
