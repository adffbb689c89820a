//! Error types for the media module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while probing or transcoding.
#[derive(Debug, Error)]
pub enum MediaToolError {
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Transcode failed: {reason}")]
    TranscodeFailed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("Transcode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    #[error("Thumbnail extraction failed: {reason}")]
    ThumbnailFailed { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },
}

impl MediaToolError {
    pub fn transcode_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::TranscodeFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }
}
