//! Trait definitions for the conversion pipeline.

use async_trait::async_trait;

use super::error::PipelineError;
use super::types::{ConversionOutput, ConversionRequest, ProbeInfo};

/// An audio converter that can probe and transform uploaded bytes.
///
/// Implementations may block on external processes and must only be called
/// off request-handling tasks; the worker pool is the intended call site.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Probes raw bytes, returning the detected container and sample rate.
    ///
    /// Fails with `UnsupportedInput` when the container is not in the
    /// supported set or no audio stream is found.
    async fn probe(&self, input: &[u8]) -> Result<ProbeInfo, PipelineError>;

    /// Runs the full pipeline: probe, derive filters, convert, size check.
    async fn convert(&self, request: ConversionRequest)
        -> Result<ConversionOutput, PipelineError>;

    /// Validates that the converter is properly configured and ready.
    async fn validate(&self) -> Result<(), PipelineError>;
}
