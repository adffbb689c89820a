use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Media tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    /// Transcodes exceeding this are killed and reported as failed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// x264 constant rate factor.
    #[serde(default = "default_crf")]
    pub crf: u8,
    /// x264 preset.
    #[serde(default = "default_preset")]
    pub preset: String,
    /// AAC bitrate for transcoded audio.
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
    /// Where in the video the thumbnail frame is grabbed.
    #[serde(default = "default_thumbnail_offset")]
    pub thumbnail_offset_secs: f64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout_secs(),
            crf: default_crf(),
            preset: default_preset(),
            audio_bitrate_kbps: default_audio_bitrate(),
            thumbnail_offset_secs: default_thumbnail_offset(),
        }
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_crf() -> u8 {
    23
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_audio_bitrate() -> u32 {
    192
}

fn default_thumbnail_offset() -> f64 {
    5.0
}
