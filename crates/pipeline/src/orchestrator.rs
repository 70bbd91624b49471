//! Task lifecycle and the per-task worker loop.
//!
//! [`Orchestrator::start`] registers a task and spawns one worker on the
//! Tokio runtime. The worker walks the plan step by step; for each group
//! iteration it builds the dependency closure of the group's outputs,
//! draws fresh seeds, submits, and polls until the engine resolves the
//! request. Malformed steps and rejected submissions are logged and
//! skipped. Only cancellation, an engine interrupt or the end of the
//! plan stops the worker.
//!
//! Every wait (delay steps, inter-repeat pauses, poll intervals) races
//! the task's [`CancellationToken`], so a cancel is observed as soon as
//! any in-flight engine call returns.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use groupexec_core::graph::WorkGraph;
use groupexec_core::plan::{seconds_to_duration, ExecutionPlan, ExecutionStep, GroupStep};
use groupexec_core::seed::randomize_seeds;
use tracing::Instrument;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::gateway::{EngineGateway, PromptStatus, SubmissionTag};
use crate::interrupts::{InterruptWatcher, InterruptedSet};
use crate::registry::{TaskRegistry, TaskSnapshot, TaskStatus, TaskTicket};

/// Entry point for start / cancel / status requests.
///
/// Construct once at startup and share behind an `Arc`.
pub struct Orchestrator {
    gateway: Arc<dyn EngineGateway>,
    registry: Arc<TaskRegistry>,
    interrupted: Arc<InterruptedSet>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn EngineGateway>, config: OrchestratorConfig) -> Self {
        Self {
            gateway,
            registry: Arc::new(TaskRegistry::new()),
            interrupted: Arc::new(InterruptedSet::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn interrupted(&self) -> &Arc<InterruptedSet> {
        &self.interrupted
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// A watcher sharing this orchestrator's registry and interrupted set.
    pub fn watcher(&self) -> InterruptWatcher {
        InterruptWatcher::new(
            Arc::clone(&self.interrupted),
            Arc::clone(&self.registry),
            self.config.interrupt_policy,
        )
    }

    /// Register `task_id` and spawn its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        task_id: &str,
        plan: ExecutionPlan,
        graph: WorkGraph,
    ) -> Result<TaskSnapshot, OrchestratorError> {
        if task_id.trim().is_empty() {
            return Err(OrchestratorError::MissingTaskId);
        }
        if plan.is_empty() {
            return Err(OrchestratorError::EmptyPlan);
        }
        if graph.is_empty() {
            return Err(OrchestratorError::MissingGraph);
        }

        let ticket = self.registry.try_register(task_id)?;

        tracing::info!(
            task_id,
            steps = plan.len(),
            expected_submissions = plan.expected_submissions(),
            nodes = graph.len(),
            "Starting orchestration task",
        );

        let worker = Worker {
            gateway: Arc::clone(&self.gateway),
            registry: Arc::clone(&self.registry),
            interrupted: Arc::clone(&self.interrupted),
            config: self.config.clone(),
            ticket: ticket.clone(),
            plan,
            graph,
        };
        let span = tracing::info_span!("orchestration_task", task_id);
        let handle = tokio::spawn(worker.run().instrument(span));
        self.registry.attach_handle(&ticket, handle);

        self.registry
            .snapshot(task_id)
            .ok_or_else(|| OrchestratorError::NotFound(task_id.to_string()))
    }

    /// Flag the task for cancellation and interrupt the engine.
    ///
    /// The interrupt is engine-wide; it is the only way to stop a
    /// submission that is already executing.
    pub async fn cancel(&self, task_id: &str) -> Result<(), OrchestratorError> {
        if !self.registry.request_cancel(task_id) {
            return Err(OrchestratorError::NotFound(task_id.to_string()));
        }
        tracing::info!(task_id, "Cancellation requested");
        self.gateway.raise_global_interrupt().await;
        Ok(())
    }

    pub fn status(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.registry.snapshot(task_id)
    }

    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.registry.snapshots()
    }

    /// Wait for the task's worker to exit and return its final state.
    pub async fn join(&self, task_id: &str) -> Option<TaskSnapshot> {
        if let Some(handle) = self.registry.take_handle(task_id) {
            if let Err(e) = handle.await {
                tracing::error!(task_id, error = %e, "Orchestration worker panicked");
            }
        }
        self.registry.snapshot(task_id)
    }

    /// Cancel every running task and wait up to `timeout` for workers.
    ///
    /// Workers dequeue their pending prompts; the one the engine is already
    /// executing is stopped with a global interrupt.
    pub async fn shutdown(&self, timeout: Duration) {
        let cancelled = self.registry.cancel_all_running();
        let handles = self.registry.take_all_handles();
        tracing::info!(cancelled, workers = handles.len(), "Shutting down orchestrator");

        if cancelled > 0 {
            self.gateway.raise_global_interrupt().await;
        }

        if tokio::time::timeout(timeout, join_all(handles)).await.is_err() {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Orchestration workers did not stop in time");
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// How a submission wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Completed,
    Interrupted,
}

struct Worker {
    gateway: Arc<dyn EngineGateway>,
    registry: Arc<TaskRegistry>,
    interrupted: Arc<InterruptedSet>,
    config: OrchestratorConfig,
    ticket: TaskTicket,
    plan: ExecutionPlan,
    graph: WorkGraph,
}

impl Worker {
    async fn run(self) {
        self.execute_plan().await;

        let status = if self.ticket.is_cancelled() {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Completed
        };
        let still_running = self.registry.finish(&self.ticket, status);
        if still_running == 0 {
            self.interrupted.clear();
        }

        tracing::info!(status = ?status, "Orchestration task finished");
    }

    async fn execute_plan(&self) {
        for (index, step) in self.plan.steps().iter().enumerate() {
            if self.ticket.is_cancelled() {
                break;
            }

            match step {
                ExecutionStep::Delay { delay_seconds } => {
                    tracing::debug!(step = index, delay_seconds, "Delay step");
                    if !self.pause(seconds_to_duration(*delay_seconds)).await {
                        break;
                    }
                }
                ExecutionStep::Group(group) => {
                    if let Err(e) = group.validate() {
                        tracing::warn!(step = index, error = %e, "Skipping malformed step");
                        self.registry
                            .update_counters(&self.ticket, |c| c.skipped_steps += 1);
                        continue;
                    }
                    if self.run_group(group).await == Resolution::Interrupted {
                        break;
                    }
                }
            }
        }
    }

    async fn run_group(&self, group: &GroupStep) -> Resolution {
        let closure = self.graph.closure(&group.output_node_ids);
        let group_name = group.group_name.as_str();

        for iteration in 1..=group.repeat_count {
            if self.ticket.is_cancelled() {
                return Resolution::Interrupted;
            }

            tracing::info!(group = group_name, iteration, repeat_count = group.repeat_count, "Executing group");

            if closure.is_empty() {
                tracing::warn!(
                    group = group_name,
                    outputs = ?group.output_node_ids,
                    "No nodes to submit for group",
                );
                self.registry.update_counters(&self.ticket, |c| c.failed += 1);
                continue;
            }

            let submission = randomize_seeds(&closure);
            let tag = SubmissionTag {
                task_id: self.ticket.task_id().to_string(),
                group: group.group_name.clone(),
                iteration,
            };

            match self.gateway.submit(&submission, &tag).await {
                Ok(request_id) => {
                    self.registry
                        .update_counters(&self.ticket, |c| c.submitted += 1);
                    tracing::info!(group = group_name, iteration, prompt_id = %request_id, "Submitted");

                    if self.wait_for_resolution(&request_id).await == Resolution::Interrupted {
                        return Resolution::Interrupted;
                    }
                    self.registry
                        .update_counters(&self.ticket, |c| c.completed_iterations += 1);
                }
                Err(e) => {
                    tracing::warn!(group = group_name, iteration, error = %e, "Submission failed, skipping iteration");
                    self.registry.update_counters(&self.ticket, |c| c.failed += 1);
                }
            }

            if iteration < group.repeat_count && !self.pause(group.delay()).await {
                return Resolution::Interrupted;
            }
        }

        Resolution::Completed
    }

    async fn wait_for_resolution(&self, request_id: &str) -> Resolution {
        self.registry
            .set_current_request(&self.ticket, Some(request_id.to_string()));
        let resolution = self.poll_until_resolved(request_id).await;
        self.registry.set_current_request(&self.ticket, None);
        resolution
    }

    /// Poll the engine until `request_id` resolves.
    ///
    /// Each tick checks, in order: the interrupted set, the cancel flag,
    /// then engine status. `NotFound` resolves only after
    /// `missing_grace_ticks` consecutive observations.
    async fn poll_until_resolved(&self, request_id: &str) -> Resolution {
        let grace_ticks = self.config.missing_grace_ticks.max(1);
        let mut missing_ticks = 0u32;

        loop {
            if self.consume_interrupt(request_id) {
                return Resolution::Interrupted;
            }

            if self.ticket.is_cancelled() {
                tracing::info!(prompt_id = %request_id, "Cancelled while waiting, dequeuing");
                self.gateway.cancel_if_queued(request_id).await;
                return Resolution::Interrupted;
            }

            match self.gateway.status(request_id).await {
                PromptStatus::Completed => {
                    // An interrupt event can land just after the history write.
                    if self.consume_interrupt(request_id) {
                        return Resolution::Interrupted;
                    }
                    tracing::debug!(prompt_id = %request_id, "Resolved in history");
                    return Resolution::Completed;
                }
                PromptStatus::Queued | PromptStatus::Running => missing_ticks = 0,
                PromptStatus::NotFound => {
                    missing_ticks += 1;
                    if missing_ticks >= grace_ticks {
                        if self.consume_interrupt(request_id) {
                            return Resolution::Interrupted;
                        }
                        tracing::warn!(prompt_id = %request_id, missing_ticks, "Request vanished, treating as resolved");
                        return Resolution::Completed;
                    }
                }
            }

            tokio::select! {
                _ = self.ticket.cancel_token().cancelled() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    fn consume_interrupt(&self, request_id: &str) -> bool {
        if self.interrupted.take(request_id) {
            tracing::warn!(prompt_id = %request_id, "Request interrupted by engine, stopping task");
            self.ticket.cancel_token().cancel();
            true
        } else {
            false
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` if
    /// the task was cancelled.
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.ticket.is_cancelled();
        }
        tokio::select! {
            _ = self.ticket.cancel_token().cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
