use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::MediaToolError;

/// Probed facts about one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: f64,
    /// Container format name ("mov" covers the mp4 family).
    pub format: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaInfo {
    /// Whether the file plays inline on common clients without transcoding:
    /// H.264 video with AAC (or no) audio in an mp4-family container.
    pub fn is_streamable(&self) -> bool {
        let container_ok = matches!(self.format.as_str(), "mov" | "mp4" | "m4a");
        let video_ok = self.video_codec.as_deref() == Some("h264");
        let audio_ok = matches!(self.audio_codec.as_deref(), None | Some("aac"));
        container_ok && video_ok && audio_ok
    }

    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }
}

/// Trait for media tool backends.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Probe container and stream facts.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaToolError>;

    /// Transcode `input` into an H.264/AAC mp4 at `output`.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), MediaToolError>;

    /// Grab a single-frame JPEG thumbnail from `input`.
    async fn thumbnail(&self, input: &Path, output: &Path) -> Result<(), MediaToolError>;

    /// Verify the backing binaries are present.
    async fn validate(&self) -> Result<(), MediaToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(format: &str, video: Option<&str>, audio: Option<&str>) -> MediaInfo {
        MediaInfo {
            path: PathBuf::from("/x"),
            size_bytes: 1,
            duration_secs: 60.0,
            format: format.to_string(),
            video_codec: video.map(String::from),
            audio_codec: audio.map(String::from),
            width: Some(1920),
            height: Some(1080),
        }
    }

    #[test]
    fn h264_aac_mp4_is_streamable() {
        assert!(info("mov", Some("h264"), Some("aac")).is_streamable());
        assert!(info("mp4", Some("h264"), None).is_streamable());
    }

    #[test]
    fn other_codecs_need_transcoding() {
        assert!(!info("matroska", Some("h264"), Some("aac")).is_streamable());
        assert!(!info("mov", Some("hevc"), Some("aac")).is_streamable());
        assert!(!info("mov", Some("h264"), Some("ac3")).is_streamable());
        assert!(!info("avi", Some("mpeg4"), Some("mp3")).is_streamable());
    }
}
