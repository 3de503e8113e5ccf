//! Service-wide failure taxonomy.
//!
//! Every user-visible failure carries an [`ErrorCode`] so the HTTP layer can
//! map it to a status without inspecting message strings, and so failed tasks
//! can persist a structured `{code, message}` payload for the polling client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classification shared across the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Bad user input: size, range, or enum violations.
    InvalidParameter,
    /// Input container/codec not recognized or carries no audio stream.
    UnsupportedInput,
    /// Requested output format is not in the supported set.
    UnsupportedOutput,
    /// The external conversion tool exited nonzero.
    ConversionFailed,
    /// Conversion output exceeded the configured size cap.
    ArtifactTooLarge,
    /// Request quota exceeded.
    RateLimited,
    /// Unknown task or blob id.
    NotFound,
    /// Task observed in an impossible state value.
    BadState,
    /// Unexpected failure; message is sanitized before surfacing.
    InternalError,
}

impl ErrorCode {
    /// HTTP status this code surfaces as.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidParameter => 400,
            ErrorCode::UnsupportedInput => 400,
            ErrorCode::UnsupportedOutput => 400,
            ErrorCode::ConversionFailed => 500,
            ErrorCode::ArtifactTooLarge => 400,
            ErrorCode::RateLimited => 429,
            ErrorCode::NotFound => 404,
            ErrorCode::BadState => 500,
            ErrorCode::InternalError => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParameter => "invalid_parameter",
            ErrorCode::UnsupportedInput => "unsupported_input",
            ErrorCode::UnsupportedOutput => "unsupported_output",
            ErrorCode::ConversionFailed => "conversion_failed",
            ErrorCode::ArtifactTooLarge => "artifact_too_large",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::NotFound => "not_found",
            ErrorCode::BadState => "bad_state",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure payload recorded on a task and returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub code: ErrorCode,
    pub message: String,
}

impl TaskError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Generic sanitized failure for errors that must not leak detail.
    pub fn internal() -> Self {
        Self::new(
            ErrorCode::InternalError,
            "An unexpected error occurred during the conversion of your file. Try again!",
        )
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("No such {} was found.", what))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for TaskError {}
