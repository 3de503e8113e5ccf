//! Submission and polling endpoints.

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use nocturne_core::{poll, submit, PollOutcome, SubmitRequest, TaskId, DEFAULT_PITCH, DEFAULT_TEMPO};

use super::error::ApiError;
use super::extract::ClientAddr;
use crate::state::AppState;

/// Submissions allowed per client per window.
const SUBMIT_LIMIT: usize = 5;
const SUBMIT_WINDOW_SECS: i64 = 300;

/// Status checks allowed per client per window.
const CHECK_LIMIT: usize = 5;
const CHECK_WINDOW_SECS: i64 = 5;

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub task_id: String,
}

/// Enqueues an uploaded audio file for conversion and returns the task id to
/// poll with `/convert/check`.
pub async fn convert_audio_file(
    State(state): State<Arc<AppState>>,
    ClientAddr(client): ClientAddr,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    state.limiter().check(
        &client,
        "do_conversion",
        SUBMIT_LIMIT,
        Duration::seconds(SUBMIT_WINDOW_SECS),
    )?;

    let mut audio: Option<(String, Vec<u8>)> = None;
    let mut output_format: Option<String> = None;
    let mut scale_pitch = DEFAULT_PITCH;
    let mut scale_tempo = DEFAULT_TEMPO;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "audio_file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::invalid(format!("failed to read audio_file: {}", e)))?;
                audio = Some((filename, bytes.to_vec()));
            }
            "output_format" => {
                output_format = Some(read_text_field(field, "output_format").await?);
            }
            "scale_pitch" => {
                scale_pitch = parse_scale(&read_text_field(field, "scale_pitch").await?, "scale_pitch")?;
            }
            "scale_tempo" => {
                scale_tempo = parse_scale(&read_text_field(field, "scale_tempo").await?, "scale_tempo")?;
            }
            _ => {}
        }
    }

    let Some((filename, input)) = audio else {
        return Err(ApiError::invalid("audio_file is required"));
    };
    let Some(output_format) = output_format else {
        return Err(ApiError::invalid("output_format is required"));
    };

    let task_id = submit(
        state.tasks(),
        state.blobs(),
        SubmitRequest {
            filename,
            input,
            output_format,
            scale_pitch,
            scale_tempo,
            owner: client,
        },
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            task_id: task_id.to_string(),
        }),
    ))
}

#[derive(Deserialize)]
pub struct CheckParams {
    pub task_id: String,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Polls an enqueued task.
///
/// A completed or failed task is reported exactly once; the record is deleted
/// with the response, and later checks for the same id return 404.
pub async fn check(
    State(state): State<Arc<AppState>>,
    ClientAddr(client): ClientAddr,
    Query(params): Query<CheckParams>,
) -> Result<Json<CheckResponse>, ApiError> {
    state.limiter().check(
        &client,
        "check_status",
        CHECK_LIMIT,
        Duration::seconds(CHECK_WINDOW_SECS),
    )?;

    let id: TaskId = params
        .task_id
        .parse()
        .map_err(|_| ApiError::invalid("bad task id"))?;

    match poll(state.tasks(), id)? {
        PollOutcome::Pending { position } => Ok(Json(CheckResponse {
            complete: false,
            position: Some(position),
            file_id: None,
        })),
        PollOutcome::Complete { result_ref } => Ok(Json(CheckResponse {
            complete: true,
            position: None,
            file_id: Some(result_ref.to_string()),
        })),
    }
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::invalid(format!("failed to read {}: {}", name, e)))
}

fn parse_scale(value: &str, name: &str) -> Result<f64, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid(format!("{} must be a number", name)))
}
