//! Task types and lifecycle states.

use chrono::{DateTime, Utc};

use crate::blob::BlobId;
use crate::convert::OutputFormat;
use crate::error::TaskError;

/// Task identifier. Assigned by the store, monotonically increasing, so id
/// order is creation order.
pub type TaskId = i64;

/// Lifecycle state of a conversion task.
///
/// Transitions only ever increase: `Queued -> Claimed -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskState {
    Queued = 0,
    Claimed = 1,
    Completed = 2,
    Failed = 3,
}

impl TaskState {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl TryFrom<i64> for TaskState {
    /// The offending raw value.
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, i64> {
        match value {
            0 => Ok(TaskState::Queued),
            1 => Ok(TaskState::Claimed),
            2 => Ok(TaskState::Completed),
            3 => Ok(TaskState::Failed),
            other => Err(other),
        }
    }
}

/// One conversion request with its lifecycle state.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    /// The uploaded source blob.
    pub input_ref: BlobId,
    pub scale_pitch: f64,
    pub scale_tempo: f64,
    pub output_format: OutputFormat,
    /// Set only once the task is Completed.
    pub result_ref: Option<BlobId>,
    /// Set only once the task is Failed.
    pub error: Option<TaskError>,
    /// Deadline after which the task is force-expired regardless of state.
    pub expire_time: DateTime<Utc>,
    /// Client identity that enqueued the task, for attribution only.
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for enqueueing a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub input_ref: BlobId,
    pub scale_pitch: f64,
    pub scale_tempo: f64,
    pub output_format: OutputFormat,
    pub expire_time: DateTime<Utc>,
    pub owner: String,
}
