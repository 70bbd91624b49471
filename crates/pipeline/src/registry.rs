//! Process-wide task registry.
//!
//! Maps task id to [`TaskEntry`] behind one [`std::sync::Mutex`]. The
//! lock is only held for map reads and writes, never across an `.await`.
//!
//! Each registration hands out a [`TaskTicket`] carrying a fresh epoch.
//! Worker-side updates go through the ticket, so a worker that outlives
//! its entry (the id was restarted after it finished) cannot touch the
//! newer task's state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use groupexec_core::types::Timestamp;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;

/// Finished entries kept for status queries before the oldest are pruned.
pub const MAX_FINISHED_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Cancelled,
    Completed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounters {
    /// Submissions the engine accepted.
    pub submitted: u32,
    /// Iterations forfeited (rejected submission or nothing to submit).
    pub failed: u32,
    /// Malformed steps skipped.
    pub skipped_steps: u32,
    /// Accepted submissions that resolved without interruption.
    pub completed_iterations: u32,
}

/// Externally visible view of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub cancel_requested: bool,
    /// Request currently being waited on, if any.
    pub current_request: Option<String>,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    #[serde(flatten)]
    pub counters: TaskCounters,
}

/// Worker-side handle to a registered task.
#[derive(Debug, Clone)]
pub struct TaskTicket {
    task_id: String,
    epoch: u64,
    cancel: CancellationToken,
}

impl TaskTicket {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct TaskEntry {
    epoch: u64,
    status: TaskStatus,
    cancel: CancellationToken,
    current_request: Option<String>,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
    counters: TaskCounters,
    handle: Option<JoinHandle<()>>,
}

impl TaskEntry {
    fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    fn snapshot(&self, task_id: &str) -> TaskSnapshot {
        TaskSnapshot {
            task_id: task_id.to_string(),
            status: self.status,
            cancel_requested: self.cancel.is_cancelled(),
            current_request: self.current_request.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            counters: self.counters.clone(),
        }
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskEntry>>,
    next_epoch: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_entry<R>(&self, ticket: &TaskTicket, f: impl FnOnce(&mut TaskEntry) -> R) -> Option<R> {
        let mut tasks = self.lock();
        tasks
            .get_mut(&ticket.task_id)
            .filter(|entry| entry.epoch == ticket.epoch)
            .map(f)
    }

    /// Register `task_id` as running.
    ///
    /// Check and insert happen under one lock acquisition, so two
    /// concurrent starts for the same id cannot both succeed.
    pub fn try_register(&self, task_id: &str) -> Result<TaskTicket, OrchestratorError> {
        let mut tasks = self.lock();
        if tasks.get(task_id).is_some_and(TaskEntry::is_running) {
            return Err(OrchestratorError::AlreadyRunning(task_id.to_string()));
        }

        prune_finished(&mut tasks);

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        tasks.insert(
            task_id.to_string(),
            TaskEntry {
                epoch,
                status: TaskStatus::Running,
                cancel: cancel.clone(),
                current_request: None,
                started_at: Utc::now(),
                finished_at: None,
                counters: TaskCounters::default(),
                handle: None,
            },
        );

        Ok(TaskTicket {
            task_id: task_id.to_string(),
            epoch,
            cancel,
        })
    }

    /// Store the worker's join handle. Dropped if the entry moved on.
    pub fn attach_handle(&self, ticket: &TaskTicket, handle: JoinHandle<()>) {
        self.with_entry(ticket, |entry| entry.handle = Some(handle));
    }

    /// Request cancellation of a running task. Returns `false` when no
    /// task with this id is running.
    pub fn request_cancel(&self, task_id: &str) -> bool {
        let tasks = self.lock();
        match tasks.get(task_id) {
            Some(entry) if entry.is_running() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Request cancellation of every running task; returns how many.
    pub fn cancel_all_running(&self) -> usize {
        let tasks = self.lock();
        let mut count = 0;
        for entry in tasks.values().filter(|e| e.is_running()) {
            entry.cancel.cancel();
            count += 1;
        }
        count
    }

    /// Cancel the running task waiting on `request_id`, if any.
    pub fn cancel_owner_of(&self, request_id: &str) -> Option<String> {
        let tasks = self.lock();
        tasks
            .iter()
            .find(|(_, e)| e.is_running() && e.current_request.as_deref() == Some(request_id))
            .map(|(task_id, entry)| {
                entry.cancel.cancel();
                task_id.clone()
            })
    }

    pub fn set_current_request(&self, ticket: &TaskTicket, request_id: Option<String>) {
        self.with_entry(ticket, |entry| entry.current_request = request_id);
    }

    pub fn update_counters(&self, ticket: &TaskTicket, f: impl FnOnce(&mut TaskCounters)) {
        self.with_entry(ticket, |entry| f(&mut entry.counters));
    }

    /// Move the task to its terminal status.
    ///
    /// Only the first call for a ticket has any effect. Returns the
    /// number of tasks still running afterwards.
    pub fn finish(&self, ticket: &TaskTicket, status: TaskStatus) -> usize {
        debug_assert!(status.is_terminal());
        let mut tasks = self.lock();
        if let Some(entry) = tasks
            .get_mut(&ticket.task_id)
            .filter(|entry| entry.epoch == ticket.epoch && entry.is_running())
        {
            entry.status = status;
            entry.finished_at = Some(Utc::now());
            entry.current_request = None;
        }
        tasks.values().filter(|e| e.is_running()).count()
    }

    pub fn snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.lock().get(task_id).map(|entry| entry.snapshot(task_id))
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        let tasks = self.lock();
        let mut all: Vec<TaskSnapshot> = tasks.iter().map(|(id, e)| e.snapshot(id)).collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        all
    }

    pub fn take_handle(&self, task_id: &str) -> Option<JoinHandle<()>> {
        self.lock().get_mut(task_id).and_then(|entry| entry.handle.take())
    }

    pub fn take_all_handles(&self) -> Vec<JoinHandle<()>> {
        self.lock()
            .values_mut()
            .filter_map(|entry| entry.handle.take())
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.lock().values().filter(|e| e.is_running()).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Drop the oldest finished entries beyond [`MAX_FINISHED_ENTRIES`].
fn prune_finished(tasks: &mut HashMap<String, TaskEntry>) {
    let mut finished: Vec<(String, Timestamp)> = tasks
        .iter()
        .filter_map(|(id, e)| e.finished_at.map(|at| (id.clone(), at)))
        .collect();
    if finished.len() < MAX_FINISHED_ENTRIES {
        return;
    }
    finished.sort_by(|a, b| a.1.cmp(&b.1));
    let excess = finished.len() + 1 - MAX_FINISHED_ENTRIES;
    for (id, _) in finished.into_iter().take(excess) {
        tasks.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn second_registration_of_running_id_conflicts() {
        let registry = TaskRegistry::new();
        let _ticket = registry.try_register("7").unwrap();

        assert_matches!(registry.try_register("7"), Err(OrchestratorError::AlreadyRunning(id)) if id == "7");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.running_count(), 1);
    }

    #[test]
    fn finished_id_can_be_registered_again() {
        let registry = TaskRegistry::new();
        let first = registry.try_register("7").unwrap();
        registry.finish(&first, TaskStatus::Completed);

        let second = registry.try_register("7").unwrap();
        assert_ne!(first.epoch, second.epoch);
        assert_eq!(registry.snapshot("7").unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn stale_ticket_cannot_touch_newer_task() {
        let registry = TaskRegistry::new();
        let stale = registry.try_register("7").unwrap();
        registry.finish(&stale, TaskStatus::Completed);
        let _fresh = registry.try_register("7").unwrap();

        registry.update_counters(&stale, |c| c.submitted += 5);
        registry.finish(&stale, TaskStatus::Cancelled);

        let snapshot = registry.snapshot("7").unwrap();
        assert_eq!(snapshot.status, TaskStatus::Running);
        assert_eq!(snapshot.counters.submitted, 0);
    }

    #[test]
    fn terminal_status_is_set_once() {
        let registry = TaskRegistry::new();
        let ticket = registry.try_register("a").unwrap();

        assert_eq!(registry.finish(&ticket, TaskStatus::Cancelled), 0);
        registry.finish(&ticket, TaskStatus::Completed);

        assert_eq!(registry.snapshot("a").unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn cancel_requests_only_reach_running_tasks() {
        let registry = TaskRegistry::new();
        let done = registry.try_register("done").unwrap();
        registry.finish(&done, TaskStatus::Completed);
        let live = registry.try_register("live").unwrap();

        assert!(!registry.request_cancel("done"));
        assert!(!registry.request_cancel("missing"));
        assert!(registry.request_cancel("live"));
        assert!(live.is_cancelled());
        assert!(!done.is_cancelled());
    }

    #[test]
    fn cancel_all_hits_every_running_task() {
        let registry = TaskRegistry::new();
        let a = registry.try_register("a").unwrap();
        let b = registry.try_register("b").unwrap();

        assert_eq!(registry.cancel_all_running(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[test]
    fn owner_lookup_uses_current_request() {
        let registry = TaskRegistry::new();
        let a = registry.try_register("a").unwrap();
        let b = registry.try_register("b").unwrap();
        registry.set_current_request(&a, Some("req-a".into()));
        registry.set_current_request(&b, Some("req-b".into()));

        assert_eq!(registry.cancel_owner_of("req-b").as_deref(), Some("b"));
        assert!(b.is_cancelled());
        assert!(!a.is_cancelled());
        assert_eq!(registry.cancel_owner_of("req-x"), None);
    }

    #[test]
    fn finished_entries_are_pruned() {
        let registry = TaskRegistry::new();
        for i in 0..MAX_FINISHED_ENTRIES + 10 {
            let ticket = registry.try_register(&i.to_string()).unwrap();
            registry.finish(&ticket, TaskStatus::Completed);
        }
        assert!(registry.len() <= MAX_FINISHED_ENTRIES);
    }
}
