use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use nocturne_core::ErrorCode;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry().gather(), &mut buffer)
        .map_err(|e| {
            tracing::error!("failed to encode metrics: {}", e);
            ApiError::new(ErrorCode::InternalError, "Internal error")
        })?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    ))
}
