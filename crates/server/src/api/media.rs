//! Converted file download and description endpoints.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use nocturne_core::{BlobId, ErrorCode};

use super::error::ApiError;
use crate::state::AppState;

const RECENTS_LIMIT: usize = 10;

/// Streams a stored blob to the client.
///
/// The filename path segment only exists so browsers pick a sensible name;
/// lookup is by id alone. Pending blobs are indistinguishable from missing
/// ones.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path((file_id, _filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let id = BlobId::from(file_id);

    let blob = state.blobs().get(&id).map_err(|e| {
        tracing::error!("failed to read blob {}: {}", id, e);
        ApiError::new(ErrorCode::InternalError, "Internal error")
    })?;

    let Some((metadata, data)) = blob.filter(|(metadata, _)| !metadata.pending) else {
        return Err(ApiError::not_found("Audio file expired or never existed."));
    };

    let headers = [
        (header::CONTENT_TYPE, metadata.content_type.clone()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", metadata.filename),
        ),
        (
            header::CACHE_CONTROL,
            "public, max-age=31536000, immutable, no-transform".to_string(),
        ),
    ];

    Ok((headers, data).into_response())
}

#[derive(Serialize)]
pub struct FileDescription {
    pub filename: String,
    pub content_type: String,
    pub expire_time: DateTime<Utc>,
    pub length: u64,
}

/// Returns basic information about a stored blob, for the front end to build
/// the download link.
pub async fn describe(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<FileDescription>, ApiError> {
    let id = BlobId::from(file_id);

    let metadata = state.blobs().describe(&id).map_err(|e| {
        tracing::error!("failed to describe blob {}: {}", id, e);
        ApiError::new(ErrorCode::InternalError, "Internal error")
    })?;

    let Some(metadata) = metadata.filter(|metadata| !metadata.pending) else {
        return Err(ApiError::not_found("Audio file expired or never existed."));
    };

    Ok(Json(FileDescription {
        filename: metadata.filename,
        content_type: metadata.content_type,
        expire_time: metadata.expire_time,
        length: metadata.length,
    }))
}

/// The most recently converted files.
pub async fn recents(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    let ids = state.blobs().recent(RECENTS_LIMIT).map_err(|e| {
        tracing::error!("failed to list recent blobs: {}", e);
        ApiError::new(ErrorCode::InternalError, "Internal error")
    })?;

    Ok(Json(ids.into_iter().map(|id| id.to_string()).collect()))
}
