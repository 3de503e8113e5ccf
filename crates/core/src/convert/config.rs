//! Configuration for the conversion pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the ffmpeg-based converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Temporary directory for converter output files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Refuse to store conversion results larger than this, in bytes.
    #[serde(default = "default_max_artifact_size")]
    pub max_artifact_size: u64,

    /// Timeout for a single conversion in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("nocturne-converter")
}

fn default_max_artifact_size() -> u64 {
    20 * 1024 * 1024
}

fn default_timeout() -> u64 {
    600
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            temp_dir: default_temp_dir(),
            max_artifact_size: default_max_artifact_size(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ConverterConfig {
    /// Creates a config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sets the artifact size cap.
    pub fn with_max_artifact_size(mut self, max: u64) -> Self {
        self.max_artifact_size = max;
        self
    }
}
