//! API error responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use nocturne_core::{ErrorCode, RateLimitError, TaskError};

/// An error surfaced to the HTTP client, carrying its taxonomy code.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Set for rate limit rejections; becomes the Retry-After header.
    pub retry_after_secs: Option<i64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self::new(err.code, err.message)
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::RateLimited { retry_after_secs } => Self {
                code: ErrorCode::RateLimited,
                message: format!(
                    "You are being ratelimited. You can make requests again in {} seconds.",
                    retry_after_secs
                ),
                retry_after_secs: Some(retry_after_secs),
            },
            RateLimitError::Store(msg) => {
                tracing::error!("rate limit store failure: {}", msg);
                Self::new(ErrorCode::InternalError, "Internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(json!({
            "error": self.code.as_str(),
            "detail": self.message,
        }));

        let mut response = (status, body).into_response();

        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
