//! FFmpeg-based media tool implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::MediaConfig;
use super::error::MediaToolError;
use super::types::{MediaInfo, MediaTool};

/// FFmpeg-based media tool.
pub struct FfmpegTool {
    config: MediaConfig,
}

impl FfmpegTool {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(MediaConfig::default())
    }

    /// Arguments for transcoding into an H.264/AAC mp4 with the moov atom
    /// up front so the result streams while still downloading.
    fn build_transcode_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.config.preset.clone(),
            "-crf".to_string(),
            self.config.crf.to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", self.config.audio_bitrate_kbps),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, MediaToolError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| MediaToolError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
            format: format_name.to_string(),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            width: video_stream.and_then(|s| s.width),
            height: video_stream.and_then(|s| s.height),
        })
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<std::process::Output, MediaToolError> {
        let child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaToolError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    MediaToolError::Io(e)
                }
            })?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        match timeout(limit, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(MediaToolError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }),
        }
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaToolError> {
        if !path.exists() {
            return Err(MediaToolError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaToolError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    MediaToolError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(MediaToolError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), MediaToolError> {
        if !input.exists() {
            return Err(MediaToolError::InputNotFound {
                path: input.to_path_buf(),
            });
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(input = %input.display(), output = %output.display(), "Transcoding");
        let args = self.build_transcode_args(input, output);
        let result = self.run_ffmpeg(&args).await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).to_string();
            return Err(MediaToolError::transcode_failed(
                format!("ffmpeg exited with code: {:?}", result.status.code()),
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        // An empty output means ffmpeg produced nothing useful.
        let meta = tokio::fs::metadata(output)
            .await
            .map_err(|_| MediaToolError::transcode_failed("Output file not created", None))?;
        if meta.len() == 0 {
            return Err(MediaToolError::transcode_failed("Output file is empty", None));
        }

        Ok(())
    }

    async fn thumbnail(&self, input: &Path, output: &Path) -> Result<(), MediaToolError> {
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            format!("{}", self.config.thumbnail_offset_secs),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vframes".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            "scale=320:-1".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            output.to_string_lossy().to_string(),
        ];

        let result = self.run_ffmpeg(&args).await?;
        if !result.status.success() {
            return Err(MediaToolError::ThumbnailFailed {
                reason: String::from_utf8_lossy(&result.stderr).to_string(),
            });
        }
        Ok(())
    }

    async fn validate(&self) -> Result<(), MediaToolError> {
        for (binary, not_found) in [
            (
                &self.config.ffmpeg_path,
                MediaToolError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                },
            ),
            (
                &self.config.ffprobe_path,
                MediaToolError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                },
            ),
        ] {
            if let Err(e) = Command::new(binary).arg("-version").output().await {
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Err(not_found);
                }
                return Err(MediaToolError::Io(e));
            }
        }
        Ok(())
    }
}
