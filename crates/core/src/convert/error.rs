//! Error types for the conversion pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::error::{ErrorCode, TaskError};

/// Errors produced while probing or converting audio.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input container not recognized or no audio stream present.
    #[error("unsupported input: {reason}")]
    UnsupportedInput { reason: String },

    /// Requested output format is not supported.
    #[error("unsupported output format: {format}")]
    UnsupportedOutput { format: String },

    /// A scale factor or derived parameter is out of range.
    #[error("{reason}")]
    InvalidParameter { reason: String },

    /// The converter process exited nonzero.
    #[error("audio conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Output exceeded the configured size cap.
    #[error("converted artifact is {size} bytes, over the {max} byte limit")]
    ArtifactTooLarge { size: u64, max: u64 },

    /// FFmpeg binary not found.
    #[error("ffmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("ffprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Conversion timed out.
    #[error("conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error talking to the external tool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the analyzer's output.
    #[error("failed to parse probe output: {reason}")]
    Parse { reason: String },
}

impl PipelineError {
    pub fn unsupported_input(reason: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::UnsupportedInput { .. } => ErrorCode::UnsupportedInput,
            PipelineError::UnsupportedOutput { .. } => ErrorCode::UnsupportedOutput,
            PipelineError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            PipelineError::ConversionFailed { .. } => ErrorCode::ConversionFailed,
            PipelineError::ArtifactTooLarge { .. } => ErrorCode::ArtifactTooLarge,
            PipelineError::FfmpegNotFound { .. }
            | PipelineError::FfprobeNotFound { .. }
            | PipelineError::Timeout { .. }
            | PipelineError::Io(_)
            | PipelineError::Parse { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<PipelineError> for TaskError {
    fn from(err: PipelineError) -> Self {
        match err.code() {
            // Tool/process failures surface a sanitized message; the detail
            // only goes to the logs.
            ErrorCode::InternalError => TaskError::internal(),
            code => TaskError::new(code, err.to_string()),
        }
    }
}
