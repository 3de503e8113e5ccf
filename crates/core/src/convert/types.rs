//! Types for the conversion pipeline.

use serde::{Deserialize, Serialize};

/// Input containers the probe accepts. Anything else is rejected before the
/// converter is ever invoked.
pub const SUPPORTED_INPUT_CONTAINERS: &[&str] = &["ogg", "oga", "opus", "mp3", "flac", "wav"];

/// Target output format for a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    M4a,
    Ogg,
}

impl OutputFormat {
    /// Parses the client-facing format name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "m4a" => Some(OutputFormat::M4a),
            "ogg" => Some(OutputFormat::Ogg),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::M4a => "m4a",
            OutputFormat::Ogg => "ogg",
        }
    }

    /// The ffmpeg muxer for this format.
    pub fn ffmpeg_muxer(&self) -> &'static str {
        match self {
            OutputFormat::M4a => "mp4",
            OutputFormat::Ogg => "ogg",
        }
    }

    /// The ffmpeg audio codec for this format.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            OutputFormat::M4a => "aac",
            OutputFormat::Ogg => "libvorbis",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::M4a => "audio/mp4",
            OutputFormat::Ogg => "audio/ogg",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.name()
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the probe learned about an input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Detected container name as reported by the analyzer.
    pub container: String,
    /// Sample rate of the first audio stream, in Hz.
    pub sample_rate: u32,
}

/// One conversion to perform.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Raw input audio bytes.
    pub input: Vec<u8>,
    pub output_format: OutputFormat,
    /// Pitch scale factor in (0, 10].
    pub scale_pitch: f64,
    /// Tempo scale factor in (0, 10].
    pub scale_tempo: f64,
}

/// Successful conversion result.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::from_name("m4a"), Some(OutputFormat::M4a));
        assert_eq!(OutputFormat::from_name("ogg"), Some(OutputFormat::Ogg));
        assert_eq!(OutputFormat::from_name("mp3"), None);
        assert_eq!(OutputFormat::from_name("M4A"), None);
    }

    #[test]
    fn test_ffmpeg_mapping() {
        assert_eq!(OutputFormat::M4a.ffmpeg_muxer(), "mp4");
        assert_eq!(OutputFormat::M4a.ffmpeg_codec(), "aac");
        assert_eq!(OutputFormat::Ogg.ffmpeg_muxer(), "ogg");
        assert_eq!(OutputFormat::Ogg.ffmpeg_codec(), "libvorbis");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(OutputFormat::M4a.content_type(), "audio/mp4");
        assert_eq!(OutputFormat::Ogg.content_type(), "audio/ogg");
    }

    #[test]
    fn test_supported_containers() {
        assert!(SUPPORTED_INPUT_CONTAINERS.contains(&"mp3"));
        assert!(SUPPORTED_INPUT_CONTAINERS.contains(&"flac"));
        assert!(!SUPPORTED_INPUT_CONTAINERS.contains(&"mp4"));
    }
}
