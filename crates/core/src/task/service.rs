//! Submission and polling contracts over the task queue.
//!
//! The HTTP layer only marshals requests into these functions; all
//! validation, blob handling, and one-shot read semantics live here.

use chrono::{Duration, Utc};
use tracing::{debug, error};

use crate::blob::{BlobId, BlobStore, NewBlob};
use crate::convert::OutputFormat;
use crate::error::{ErrorCode, TaskError};
use crate::metrics;

use super::store::{TaskStore, TaskStoreError};
use super::types::{NewTask, TaskId, TaskState};

/// Pitch scale applied when the client omits one.
pub const DEFAULT_PITCH: f64 = 1.25;
/// Tempo scale applied when the client omits one.
pub const DEFAULT_TEMPO: f64 = 1.10;

/// How long task records and their blobs live before force-expiry.
const TTL_HOURS: i64 = 24;

/// A validated-on-entry submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub filename: String,
    pub input: Vec<u8>,
    /// Client-supplied format name; validated against the supported set.
    pub output_format: String,
    pub scale_pitch: f64,
    pub scale_tempo: f64,
    /// Client identity, for attribution.
    pub owner: String,
}

/// Non-error outcomes of a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Task is still Queued or Claimed; position is a 1-based advisory
    /// estimate of how much work precedes it.
    Pending { position: i64 },
    /// Task finished; the record has been deleted and this is the only time
    /// the result will be handed out through this path.
    Complete { result_ref: BlobId },
}

fn check_scale(name: &str, value: f64) -> Result<(), TaskError> {
    if !value.is_finite() || value <= 0.0 || value > 10.0 {
        return Err(TaskError::new(
            ErrorCode::InvalidParameter,
            format!("{} must be greater than 0 and at most 10", name),
        ));
    }
    Ok(())
}

/// Validates and enqueues a conversion, returning the new task id.
///
/// Validation happens before any write: a rejected submission leaves no task
/// and no blob behind.
pub fn submit(
    tasks: &dyn TaskStore,
    blobs: &dyn BlobStore,
    request: SubmitRequest,
) -> Result<TaskId, TaskError> {
    let Some(output_format) = OutputFormat::from_name(&request.output_format) else {
        return Err(TaskError::new(
            ErrorCode::InvalidParameter,
            format!("unsupported output format: {}", request.output_format),
        ));
    };
    check_scale("scale_pitch", request.scale_pitch)?;
    check_scale("scale_tempo", request.scale_tempo)?;

    let deadline = Utc::now() + Duration::hours(TTL_HOURS);

    let input_ref = blobs
        .put(
            NewBlob {
                filename: request.filename,
                content_type: "application/octet-stream".to_string(),
                pending: true,
                expire_time: deadline,
                uploaded_by: request.owner.clone(),
            },
            &request.input,
        )
        .map_err(|e| {
            error!("failed to store uploaded audio: {}", e);
            TaskError::internal()
        })?;

    let task = tasks
        .enqueue(NewTask {
            input_ref,
            scale_pitch: request.scale_pitch,
            scale_tempo: request.scale_tempo,
            output_format,
            expire_time: deadline,
            owner: request.owner,
        })
        .map_err(|e| {
            error!("failed to enqueue task: {}", e);
            TaskError::internal()
        })?;

    metrics::TASKS_ENQUEUED.inc();
    debug!(task_id = task.id, "enqueued conversion task");

    Ok(task.id)
}

/// Polls a task by id.
///
/// A terminal observation is a one-shot read: the record is deleted before
/// returning, and subsequent polls for the same id report NotFound.
pub fn poll(tasks: &dyn TaskStore, id: TaskId) -> Result<PollOutcome, TaskError> {
    let task = match tasks.get(id) {
        Ok(Some(task)) => task,
        Ok(None) => return Err(TaskError::not_found("task")),
        Err(TaskStoreError::BadState { id, value }) => {
            error!(task_id = id, value, "task has an impossible state value");
            return Err(TaskError::new(
                ErrorCode::BadState,
                "Request is in a bad state. Try making a new one!",
            ));
        }
        Err(e) => {
            error!("failed to read task {}: {}", id, e);
            return Err(TaskError::internal());
        }
    };

    match task.state {
        TaskState::Completed => {
            let Some(result_ref) = task.result_ref else {
                error!(task_id = id, "completed task has no result reference");
                return Err(TaskError::internal());
            };
            if let Err(e) = tasks.delete(id) {
                error!("failed to delete finished task {}: {}", id, e);
            }
            Ok(PollOutcome::Complete { result_ref })
        }
        TaskState::Failed => {
            let failure = task.error.unwrap_or_else(TaskError::internal);
            if let Err(e) = tasks.delete(id) {
                error!("failed to delete failed task {}: {}", id, e);
            }
            Err(failure)
        }
        TaskState::Queued | TaskState::Claimed => {
            let ahead = tasks.queued_ahead(id).map_err(|e| {
                error!("failed to count queue position for {}: {}", id, e);
                TaskError::internal()
            })?;
            Ok(PollOutcome::Pending {
                position: ahead + 1,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::SqliteBlobStore;
    use crate::task::SqliteTaskStore;

    fn stores() -> (SqliteTaskStore, SqliteBlobStore) {
        (
            SqliteTaskStore::in_memory().unwrap(),
            SqliteBlobStore::in_memory().unwrap(),
        )
    }

    fn submit_request() -> SubmitRequest {
        SubmitRequest {
            filename: "track.mp3".to_string(),
            input: vec![1, 2, 3, 4],
            output_format: "m4a".to_string(),
            scale_pitch: DEFAULT_PITCH,
            scale_tempo: DEFAULT_TEMPO,
            owner: "127.0.0.1".to_string(),
        }
    }

    #[test]
    fn test_submit_creates_pending_blob_and_queued_task() {
        let (tasks, blobs) = stores();

        let id = submit(&tasks, &blobs, submit_request()).unwrap();

        let task = tasks.get(id).unwrap().unwrap();
        assert_eq!(task.state, TaskState::Queued);
        assert_eq!(task.owner, "127.0.0.1");

        let (meta, data) = blobs.get(&task.input_ref).unwrap().unwrap();
        assert!(meta.pending);
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_submit_rejects_unknown_format_before_any_write() {
        let (tasks, blobs) = stores();

        let mut request = submit_request();
        request.output_format = "mp3".to_string();

        let err = submit(&tasks, &blobs, request).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);

        // Nothing was created.
        assert!(tasks.claim_oldest().unwrap().is_none());
        assert!(blobs.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_submit_rejects_out_of_range_scales() {
        let (tasks, blobs) = stores();

        for (pitch, tempo) in [(0.0, 1.0), (-1.0, 1.0), (10.5, 1.0), (1.0, 0.0), (1.0, 11.0)] {
            let mut request = submit_request();
            request.scale_pitch = pitch;
            request.scale_tempo = tempo;
            let err = submit(&tasks, &blobs, request).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidParameter);
        }

        assert!(tasks.claim_oldest().unwrap().is_none());
    }

    #[test]
    fn test_poll_unknown_task() {
        let (tasks, _) = stores();
        let err = poll(&tasks, 99).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_poll_reports_position_while_pending() {
        let (tasks, blobs) = stores();

        let first = submit(&tasks, &blobs, submit_request()).unwrap();
        let second = submit(&tasks, &blobs, submit_request()).unwrap();

        assert_eq!(
            poll(&tasks, first).unwrap(),
            PollOutcome::Pending { position: 1 }
        );
        assert_eq!(
            poll(&tasks, second).unwrap(),
            PollOutcome::Pending { position: 2 }
        );

        // Position holds while the task is merely claimed.
        tasks.claim_oldest().unwrap().unwrap();
        assert_eq!(
            poll(&tasks, first).unwrap(),
            PollOutcome::Pending { position: 1 }
        );
    }

    #[test]
    fn test_poll_completed_is_one_shot() {
        let (tasks, blobs) = stores();

        let id = submit(&tasks, &blobs, submit_request()).unwrap();
        let claimed = tasks.claim_oldest().unwrap().unwrap();

        let result_ref = BlobId::generate();
        tasks
            .complete(claimed.id, &result_ref, claimed.expire_time)
            .unwrap();

        let outcome = poll(&tasks, id).unwrap();
        assert_eq!(outcome, PollOutcome::Complete { result_ref });

        // The record is gone after the first terminal read.
        let err = poll(&tasks, id).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_poll_failed_returns_stored_error_once() {
        let (tasks, blobs) = stores();

        let id = submit(&tasks, &blobs, submit_request()).unwrap();
        let claimed = tasks.claim_oldest().unwrap().unwrap();

        let failure = TaskError::new(ErrorCode::UnsupportedInput, "container 'mp4' is not supported");
        tasks.fail(claimed.id, &failure, claimed.expire_time).unwrap();

        let err = poll(&tasks, id).unwrap_err();
        assert_eq!(err, failure);

        let err = poll(&tasks, id).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
