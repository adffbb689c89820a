//! Media tool stand-in that fakes probing and transcoding.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::media::{MediaInfo, MediaTool, MediaToolError};

/// Mock media tool.
///
/// `set_streamable` controls what probes report; transcodes write a small
/// real file so downstream size checks and splitting work on actual bytes.
pub struct MockMediaTool {
    streamable: RwLock<bool>,
    fail_transcode: RwLock<bool>,
    fail_thumbnail: RwLock<bool>,
    transcodes: RwLock<Vec<(PathBuf, PathBuf)>>,
    thumbnails: RwLock<Vec<PathBuf>>,
}

impl Default for MockMediaTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaTool {
    pub fn new() -> Self {
        Self {
            streamable: RwLock::new(true),
            fail_transcode: RwLock::new(false),
            fail_thumbnail: RwLock::new(false),
            transcodes: RwLock::new(Vec::new()),
            thumbnails: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_streamable(&self, streamable: bool) {
        *self.streamable.write().await = streamable;
    }

    pub async fn fail_transcodes(&self, fail: bool) {
        *self.fail_transcode.write().await = fail;
    }

    pub async fn fail_thumbnails(&self, fail: bool) {
        *self.fail_thumbnail.write().await = fail;
    }

    pub async fn transcode_count(&self) -> usize {
        self.transcodes.read().await.len()
    }

    pub async fn thumbnail_count(&self) -> usize {
        self.thumbnails.read().await.len()
    }
}

#[async_trait]
impl MediaTool for MockMediaTool {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaToolError> {
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let streamable = *self.streamable.read().await;
        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs: 120.0,
            format: if streamable { "mov" } else { "matroska" }.to_string(),
            video_codec: Some(if streamable { "h264" } else { "hevc" }.to_string()),
            audio_codec: Some("aac".to_string()),
            width: Some(1280),
            height: Some(720),
        })
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), MediaToolError> {
        if *self.fail_transcode.read().await {
            return Err(MediaToolError::transcode_failed("scripted failure", None));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::read(input).await.unwrap_or_default();
        tokio::fs::write(output, bytes).await?;
        self.transcodes
            .write()
            .await
            .push((input.to_path_buf(), output.to_path_buf()));
        Ok(())
    }

    async fn thumbnail(&self, _input: &Path, output: &Path) -> Result<(), MediaToolError> {
        if *self.fail_thumbnail.read().await {
            return Err(MediaToolError::ThumbnailFailed {
                reason: "scripted failure".to_string(),
            });
        }
        // Like ffmpeg, fails when the output directory does not exist.
        tokio::fs::write(output, b"jpeg").await?;
        self.thumbnails.write().await.push(output.to_path_buf());
        Ok(())
    }

    async fn validate(&self) -> Result<(), MediaToolError> {
        Ok(())
    }
}
