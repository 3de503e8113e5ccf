//! Conversion workers.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::blob::{BlobId, BlobStore, NewBlob};
use crate::convert::{AudioConverter, ConversionRequest, OutputFormat};
use crate::error::TaskError;
use crate::metrics;
use crate::task::{Task, TaskStore};

use super::dispatcher::WorkItem;

static FILENAME_SCRUB: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^-\w.]").unwrap());

/// Worker loop: pull items until the termination marker arrives.
///
/// A failed task never takes the worker down; every error is recorded on the
/// task (or logged, for store failures) and the loop pulls the next item.
pub(crate) async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    converter: Arc<dyn AudioConverter>,
    result_ttl_secs: u64,
) {
    debug!(worker = worker_id, "Worker started");

    loop {
        let item = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        match item {
            Some(WorkItem::Task(task)) => {
                process_task(
                    worker_id,
                    &task,
                    tasks.as_ref(),
                    blobs.as_ref(),
                    converter.as_ref(),
                    result_ttl_secs,
                )
                .await;
            }
            Some(WorkItem::Shutdown) | None => break,
        }
    }

    info!(worker = worker_id, "Worker exited");
}

/// Runs one claimed task to a terminal state.
///
/// The consumed input blob is released exactly once, whatever the outcome;
/// a cleanup failure is logged but never overrides the task's result.
async fn process_task(
    worker_id: usize,
    task: &Task,
    tasks: &dyn TaskStore,
    blobs: &dyn BlobStore,
    converter: &dyn AudioConverter,
    result_ttl_secs: u64,
) {
    debug!(worker = worker_id, task_id = task.id, "Processing task");

    let outcome = run_pipeline(task, blobs, converter, result_ttl_secs).await;

    match outcome {
        Ok(result_ref) => {
            match tasks.complete(task.id, &result_ref, task.expire_time) {
                Ok(true) => {
                    metrics::TASKS_COMPLETED.inc();
                    info!(task_id = task.id, "Task completed");
                }
                Ok(false) => {
                    // The task expired or was deleted mid-flight; the result
                    // is simply never observed.
                    debug!(task_id = task.id, "Task vanished before completion write");
                }
                Err(e) => {
                    error!("Failed to record completion of task {}: {}", task.id, e);
                }
            }
        }
        Err(failure) => {
            metrics::TASKS_FAILED
                .with_label_values(&[failure.code.as_str()])
                .inc();
            warn!(task_id = task.id, "Task failed: {}", failure);
            match tasks.fail(task.id, &failure, task.expire_time) {
                Ok(true) | Ok(false) => {}
                Err(e) => {
                    error!("Failed to record failure of task {}: {}", task.id, e);
                }
            }
        }
    }

    if let Err(e) = blobs.delete(&task.input_ref) {
        warn!(
            "Failed to release input blob {} of task {}: {}",
            task.input_ref, task.id, e
        );
    }
}

/// The conversion pipeline for one task: fetch input, convert, store result.
///
/// Never mutates the task; the caller owns all state transitions.
async fn run_pipeline(
    task: &Task,
    blobs: &dyn BlobStore,
    converter: &dyn AudioConverter,
    result_ttl_secs: u64,
) -> Result<BlobId, TaskError> {
    let input = blobs.get(&task.input_ref).map_err(|e| {
        error!("Failed to read input blob {}: {}", task.input_ref, e);
        TaskError::internal()
    })?;

    let Some((input_meta, input_bytes)) = input else {
        return Err(TaskError::not_found("pending file"));
    };

    let start = Instant::now();
    let output = converter
        .convert(ConversionRequest {
            input: input_bytes,
            output_format: task.output_format,
            scale_pitch: task.scale_pitch,
            scale_tempo: task.scale_tempo,
        })
        .await
        .map_err(|e| {
            debug!(task_id = task.id, "Conversion failed: {}", e);
            TaskError::from(e)
        })?;

    metrics::CONVERSION_DURATION.observe(start.elapsed().as_secs_f64());
    metrics::ARTIFACT_SIZE.observe(output.bytes.len() as f64);

    let result_ref = blobs
        .put(
            NewBlob {
                filename: night_filename(&input_meta.filename, task.output_format),
                content_type: output.content_type.to_string(),
                pending: false,
                expire_time: Utc::now() + Duration::seconds(result_ttl_secs as i64),
                uploaded_by: task.owner.clone(),
            },
            &output.bytes,
        )
        .map_err(|e| {
            error!("Failed to store conversion result: {}", e);
            TaskError::internal()
        })?;

    Ok(result_ref)
}

/// Derives the download filename for a conversion result: scrubbed original
/// stem plus a `.night.<ext>` suffix.
fn night_filename(original: &str, format: OutputFormat) -> String {
    let cleaned = FILENAME_SCRUB
        .replace_all(&original.trim().replace(' ', "_"), "")
        .into_owned();

    let stem = match cleaned.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => cleaned.as_str(),
    };

    if stem.is_empty() {
        format!("audio.night.{}", format.extension())
    } else {
        format!("{}.night.{}", stem, format.extension())
    }
}
