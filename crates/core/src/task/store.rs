//! Task storage trait.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::blob::BlobId;
use crate::error::TaskError;

use super::types::{NewTask, Task, TaskId};

/// Error type for task store operations.
#[derive(Debug)]
pub enum TaskStoreError {
    /// Task record holds a state value outside the known machine.
    BadState { id: TaskId, value: i64 },
    /// Database error.
    Database(String),
}

impl fmt::Display for TaskStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStoreError::BadState { id, value } => {
                write!(f, "task {} has invalid state value {}", id, value)
            }
            TaskStoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for TaskStoreError {}

/// Trait for task queue backends.
///
/// `claim_oldest` is the queue's sole mutual-exclusion mechanism: it must
/// atomically find the lowest-id Queued task and transition it to Claimed, so
/// that no two callers (in this process or another sharing the store) ever
/// claim the same task.
pub trait TaskStore: Send + Sync {
    /// Enqueues a new task in the Queued state.
    fn enqueue(&self, task: NewTask) -> Result<Task, TaskStoreError>;

    /// Fetches a task by id.
    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError>;

    /// Atomically claims the oldest Queued task, transitioning it to Claimed.
    /// Returns `None` when nothing is queued.
    fn claim_oldest(&self) -> Result<Option<Task>, TaskStoreError>;

    /// Marks a Claimed task Completed with its result blob. Returns false if
    /// the task is no longer in the Claimed state (already terminal, or
    /// force-expired and gone).
    fn complete(
        &self,
        id: TaskId,
        result_ref: &BlobId,
        expire_time: DateTime<Utc>,
    ) -> Result<bool, TaskStoreError>;

    /// Marks a Claimed task Failed with the given error. Same return
    /// semantics as [`TaskStore::complete`].
    fn fail(
        &self,
        id: TaskId,
        error: &TaskError,
        expire_time: DateTime<Utc>,
    ) -> Result<bool, TaskStoreError>;

    /// Deletes a task record. Returns whether anything was removed.
    fn delete(&self, id: TaskId) -> Result<bool, TaskStoreError>;

    /// Count of not-yet-terminal tasks created before the given id. Advisory:
    /// computed at read time, so it can drift as tasks complete.
    fn queued_ahead(&self, id: TaskId) -> Result<i64, TaskStoreError>;

    /// Force-expires task records whose deadline has passed, regardless of
    /// state. Returns the number removed.
    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, TaskStoreError>;
}
