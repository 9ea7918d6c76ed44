//! Task registry: bookkeeping for admitted work.
//!
//! Tracks every admitted request — its priority, lifecycle state, and
//! cancellation handle — independent of whether its output is ever
//! delivered. The registry is a single-instance service object; construct
//! it once at process start and share it by reference.
//!
//! Entries are never garbage-collected. Completed and aborted tasks stay
//! in the map until [`TaskRegistry::evict_finished`] removes them, so the
//! operator surface can still inspect recently finished work.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{Priority, TaskState};

/// A tracked unit of admitted processing work.
///
/// Created by [`TaskRegistry::register`], mutated only through the
/// registry. Every accessor returns a clone — callers never see the
/// registry's own copy.
#[derive(Debug, Clone)]
pub struct Task {
    /// Short human-legible identifier, e.g. `0x3FA9`.
    pub id: String,
    /// Conversation this task belongs to.
    pub conversation_id: String,
    /// The inbound query text that admitted this task.
    pub query_text: String,
    /// Urgency tier; mutable via [`TaskRegistry::set_priority`].
    pub priority: Priority,
    /// Current lifecycle state.
    pub state: TaskState,
    /// When the task was admitted.
    pub created_at: DateTime<Utc>,
    /// When the task entered [`TaskState::Running`], if it has.
    pub started_at: Option<DateTime<Utc>>,
    /// Cancellation handle for the processing turn, once spawned.
    pub abort: Option<AbortHandle>,
}

/// Registry of admitted tasks keyed by their short id.
///
/// All mutations are serialized through one registry-wide mutex. The lock
/// is never held across an `.await`, so unrelated conversations do not
/// contend on anything slower than a map operation.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Task>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a new task and return a copy of its record.
    ///
    /// The id is always fresh and unique: four uppercase hex digits drawn
    /// from uuid entropy, widened to eight on sustained collision.
    pub fn register(&self, conversation_id: &str, query_text: &str, priority: Priority) -> Task {
        let mut tasks = self.guard();
        let id = fresh_id(&tasks);
        let task = Task {
            id: id.clone(),
            conversation_id: conversation_id.to_owned(),
            query_text: query_text.to_owned(),
            priority,
            state: TaskState::Pending,
            created_at: Utc::now(),
            started_at: None,
            abort: None,
        };
        tasks.insert(id.clone(), task.clone());
        info!(
            task_id = %id,
            priority = %priority,
            conversation_id = %conversation_id,
            "task registered"
        );
        task
    }

    /// Update a task's lifecycle state.
    ///
    /// Unknown ids are a no-op, not an error — the task may already have
    /// been evicted. A transition to [`TaskState::Running`] records
    /// `started_at`.
    pub fn update_state(&self, task_id: &str, new_state: TaskState) {
        let mut tasks = self.guard();
        if let Some(task) = tasks.get_mut(task_id) {
            task.state = new_state;
            if new_state == TaskState::Running {
                task.started_at = Some(Utc::now());
            }
            debug!(task_id = %task_id, state = %new_state, "task state updated");
        }
    }

    /// Attach the cancellation handle for a task's processing turn.
    ///
    /// Called by the orchestrator right after it spawns the turn. Returns
    /// false if the id is unknown.
    pub fn bind_handle(&self, task_id: &str, handle: AbortHandle) -> bool {
        let mut tasks = self.guard();
        match tasks.get_mut(task_id) {
            Some(task) => {
                task.abort = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every task in an active state (pending, running, shelved).
    ///
    /// Returns copies; the registry's own records stay private.
    pub fn list_active(&self) -> Vec<Task> {
        self.guard()
            .values()
            .filter(|t| t.state.is_active())
            .cloned()
            .collect()
    }

    /// Abort a task's processing turn.
    ///
    /// Returns true if the task held a live cancellation handle, which was
    /// invoked and the state set to [`TaskState::Aborted`]. Unknown ids and
    /// tasks whose turn already finished (or was never spawned) return
    /// false without raising.
    pub fn abort(&self, task_id: &str) -> bool {
        let mut tasks = self.guard();
        let Some(task) = tasks.get_mut(task_id) else {
            return false;
        };
        match &task.abort {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                task.state = TaskState::Aborted;
                warn!(task_id = %task_id, "task aborted by operator");
                true
            }
            _ => false,
        }
    }

    /// Reprioritize a task in place. Returns false if the id is unknown.
    pub fn set_priority(&self, task_id: &str, priority: Priority) -> bool {
        let mut tasks = self.guard();
        match tasks.get_mut(task_id) {
            Some(task) => {
                task.priority = priority;
                info!(task_id = %task_id, priority = %priority, "task priority changed");
                true
            }
            None => false,
        }
    }

    /// Remove completed and aborted entries, returning how many were evicted.
    ///
    /// This is the only purge path — nothing is removed automatically.
    pub fn evict_finished(&self) -> usize {
        let mut tasks = self.guard();
        let before = tasks.len();
        tasks.retain(|_, t| t.state.is_active());
        let evicted = before.saturating_sub(tasks.len());
        if evicted > 0 {
            info!(evicted, "finished tasks evicted");
        }
        evicted
    }

    /// Number of tracked tasks, active or finished.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Whether the registry holds no tasks at all.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

/// Allocate an id not present in `tasks`.
///
/// Four uppercase hex digits cover 65k ids; after a handful of collisions
/// the width doubles, so the loop terminates even on a very full map.
fn fresh_id(tasks: &HashMap<String, Task>) -> String {
    for attempt in 0u32.. {
        let hex = Uuid::new_v4().simple().to_string();
        let width = if attempt < 8 { 4 } else { 8 };
        let candidate = format!("0x{}", hex[..width].to_uppercase());
        if !tasks.contains_key(&candidate) {
            return candidate;
        }
    }
    unreachable!("id space exhausted");
}
