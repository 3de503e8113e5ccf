//! Mock converter for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::convert::{
    AudioConverter, ConversionOutput, ConversionRequest, PipelineError, ProbeInfo,
};

/// A recorded conversion request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The request that was submitted.
    pub request: ConversionRequest,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the AudioConverter trait.
///
/// Provides controllable behavior for testing:
/// - Track conversion requests for assertions
/// - Simulate success/failure
/// - Control probe results and output bytes
#[derive(Debug, Clone)]
pub struct MockConverter {
    /// Recorded conversions.
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    /// Probe result returned for any input.
    probe_result: Arc<RwLock<ProbeInfo>>,
    /// Bytes returned from successful conversions.
    output_bytes: Arc<RwLock<Vec<u8>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<PipelineError>>>,
    /// Simulated conversion duration in milliseconds.
    conversion_duration_ms: Arc<RwLock<u64>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            probe_result: Arc::new(RwLock::new(ProbeInfo {
                container: "mp3".to_string(),
                sample_rate: 44100,
            })),
            output_bytes: Arc::new(RwLock::new(b"converted-audio".to_vec())),
            next_error: Arc::new(RwLock::new(None)),
            conversion_duration_ms: Arc::new(RwLock::new(0)),
        }
    }

    /// Get all recorded conversions.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Get the number of conversions performed.
    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Set the probe result returned for any input.
    pub async fn set_probe_result(&self, info: ProbeInfo) {
        *self.probe_result.write().await = info;
    }

    /// Set the bytes returned from successful conversions.
    pub async fn set_output_bytes(&self, bytes: Vec<u8>) {
        *self.output_bytes.write().await = bytes;
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: PipelineError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated conversion duration.
    pub async fn set_conversion_duration(&self, duration: Duration) {
        *self.conversion_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Take the next error if set.
    async fn take_error(&self) -> Option<PipelineError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl AudioConverter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, _input: &[u8]) -> Result<ProbeInfo, PipelineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(self.probe_result.read().await.clone())
    }

    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutput, PipelineError> {
        if let Some(err) = self.take_error().await {
            self.conversions.write().await.push(RecordedConversion {
                request,
                success: false,
            });
            return Err(err);
        }

        let content_type = request.output_format.content_type();

        self.conversions.write().await.push(RecordedConversion {
            request,
            success: true,
        });

        let duration_ms = *self.conversion_duration_ms.read().await;
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        Ok(ConversionOutput {
            bytes: self.output_bytes.read().await.clone(),
            content_type,
        })
    }

    async fn validate(&self) -> Result<(), PipelineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::OutputFormat;

    fn request() -> ConversionRequest {
        ConversionRequest {
            input: vec![1, 2, 3],
            output_format: OutputFormat::Ogg,
            scale_pitch: 1.25,
            scale_tempo: 1.10,
        }
    }

    #[tokio::test]
    async fn test_basic_conversion() {
        let converter = MockConverter::new();

        let output = converter.convert(request()).await.unwrap();
        assert_eq!(output.bytes, b"converted-audio");
        assert_eq!(output.content_type, "audio/ogg");
        assert_eq!(converter.conversion_count().await, 1);
    }

    #[tokio::test]
    async fn test_error_injection() {
        let converter = MockConverter::new();
        converter
            .set_next_error(PipelineError::unsupported_input("not audio"))
            .await;

        let result = converter.convert(request()).await;
        assert!(result.is_err());

        // Error is consumed, conversion recorded as failed.
        let conversions = converter.recorded_conversions().await;
        assert_eq!(conversions.len(), 1);
        assert!(!conversions[0].success);

        // The next conversion succeeds again.
        assert!(converter.convert(request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_custom_probe_result() {
        let converter = MockConverter::new();
        converter
            .set_probe_result(ProbeInfo {
                container: "flac".to_string(),
                sample_rate: 96000,
            })
            .await;

        let info = converter.probe(b"whatever").await.unwrap();
        assert_eq!(info.container, "flac");
        assert_eq!(info.sample_rate, 96000);
    }
}
