//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::config::ConverterConfig;
use super::error::PipelineError;
use super::filters::{derive_filter_chain, render_filter_chain};
use super::traits::AudioConverter;
use super::types::{
    ConversionOutput, ConversionRequest, OutputFormat, ProbeInfo, SUPPORTED_INPUT_CONTAINERS,
};

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds ffmpeg arguments for a conversion to a file output.
    ///
    /// Output goes to a file rather than a pipe because the mp4 muxer needs a
    /// seekable output.
    fn build_convert_args(
        input_container: &str,
        format: OutputFormat,
        filter_chain: &str,
        output_path: &Path,
    ) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            input_container.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-vn".to_string(),
            "-c:a".to_string(),
            format.ffmpeg_codec().to_string(),
            "-af".to_string(),
            filter_chain.to_string(),
            "-f".to_string(),
            format.ffmpeg_muxer().to_string(),
            output_path.to_string_lossy().to_string(),
        ]
    }

    /// Parses ffprobe JSON output into a ProbeInfo.
    fn parse_probe_output(output: &str) -> Result<ProbeInfo, PipelineError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            sample_rate: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| PipelineError::Parse {
                reason: format!("failed to parse ffprobe output: {}", e),
            })?;

        let Some(format) = probe.format else {
            return Err(PipelineError::unsupported_input(
                "input format not recognized",
            ));
        };

        if !SUPPORTED_INPUT_CONTAINERS.contains(&format.format_name.as_str()) {
            return Err(PipelineError::unsupported_input(format!(
                "container '{}' is not supported",
                format.format_name
            )));
        }

        let sample_rate = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "audio")
            .and_then(|s| s.sample_rate.as_ref())
            .and_then(|r| r.parse::<u32>().ok())
            .ok_or_else(|| {
                PipelineError::unsupported_input("could not find an audio stream in input")
            })?;

        Ok(ProbeInfo {
            container: format.format_name,
            sample_rate,
        })
    }

    /// Runs ffprobe over the input bytes and returns its stdout.
    async fn run_probe(&self, input: &[u8]) -> Result<String, PipelineError> {
        let mut child = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PipelineError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    PipelineError::Io(e)
                }
            })?;

        let mut stdin = child.stdin.take().expect("stdin should be piped");
        let data = input.to_vec();
        let writer = tokio::spawn(async move {
            // The probe may close stdin once it has seen enough; a broken
            // pipe here is not an error.
            let _ = stdin.write_all(&data).await;
            let _ = stdin.shutdown().await;
        });

        let output = child.wait_with_output().await.map_err(PipelineError::Io)?;
        let _ = writer.await;

        // ffprobe exits nonzero for streams it cannot identify at all.
        if !output.status.success() && output.stdout.is_empty() {
            return Err(PipelineError::unsupported_input(
                "input format not recognized",
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs ffmpeg writing the converted stream to `output_path`.
    async fn run_convert(
        &self,
        input: Vec<u8>,
        args: Vec<String>,
    ) -> Result<(), PipelineError> {
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PipelineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    PipelineError::Io(e)
                }
            })?;

        let mut stdin = child.stdin.take().expect("stdin should be piped");
        let writer = tokio::spawn(async move {
            // ffmpeg closes stdin early on fatal errors; the exit status is
            // what decides success.
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let mut stderr = child.stderr.take().expect("stderr should be piped");

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut err_buf = Vec::new();
            stderr.read_to_end(&mut err_buf).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, err_buf))
        })
        .await;

        match result {
            Ok(Ok((status, err_buf))) => {
                let _ = writer.await;
                if !status.success() {
                    let stderr_text = String::from_utf8_lossy(&err_buf).into_owned();
                    warn!("ffmpeg failed: {}", stderr_text.trim());
                    return Err(PipelineError::conversion_failed(
                        format!("converter exited with status {:?}", status.code()),
                        (!stderr_text.is_empty()).then_some(stderr_text),
                    ));
                }
                Ok(())
            }
            Ok(Err(e)) => {
                writer.abort();
                Err(PipelineError::Io(e))
            }
            Err(_) => {
                writer.abort();
                let _ = child.kill().await;
                Err(PipelineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        }
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, input: &[u8]) -> Result<ProbeInfo, PipelineError> {
        let stdout = self.run_probe(input).await?;
        Self::parse_probe_output(&stdout)
    }

    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutput, PipelineError> {
        let info = self.probe(&request.input).await?;

        let new_sample_rate = (f64::from(info.sample_rate) * request.scale_pitch).round() as u32;
        let stages = derive_filter_chain(request.scale_tempo, info.sample_rate, new_sample_rate)?;
        let filter_chain = render_filter_chain(&stages);

        debug!(
            container = %info.container,
            sample_rate = info.sample_rate,
            filters = %filter_chain,
            "starting conversion"
        );

        let job_dir: PathBuf = self
            .config
            .temp_dir
            .join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(PipelineError::Io)?;
        let output_path = job_dir.join(format!("output.{}", request.output_format.extension()));

        let args = Self::build_convert_args(
            &info.container,
            request.output_format,
            &filter_chain,
            &output_path,
        );

        let convert_result = self.run_convert(request.input, args).await;

        let read_result = match convert_result {
            Ok(()) => {
                let meta = tokio::fs::metadata(&output_path).await.map_err(|_| {
                    PipelineError::conversion_failed("converter produced no output file", None)
                });
                match meta {
                    Ok(meta) if meta.len() > self.config.max_artifact_size => {
                        Err(PipelineError::ArtifactTooLarge {
                            size: meta.len(),
                            max: self.config.max_artifact_size,
                        })
                    }
                    Ok(_) => tokio::fs::read(&output_path).await.map_err(PipelineError::Io),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        let _ = tokio::fs::remove_dir_all(&job_dir).await;

        Ok(ConversionOutput {
            bytes: read_result?,
            content_type: request.output_format.content_type(),
        })
    }

    async fn validate(&self) -> Result<(), PipelineError> {
        // Check ffmpeg exists
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(PipelineError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(PipelineError::Io(e));
        }

        // Check ffprobe exists
        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(PipelineError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(PipelineError::Io(e));
        }

        // Ensure temp dir exists
        tokio::fs::create_dir_all(&self.config.temp_dir)
            .await
            .map_err(PipelineError::Io)?;

        Ok(())
    }
}
