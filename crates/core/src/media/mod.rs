//! Media probing, transcoding and thumbnail extraction.

mod config;
mod error;
mod ffmpeg;
mod types;

pub use config::MediaConfig;
pub use error::MediaToolError;
pub use ffmpeg::FfmpegTool;
pub use types::{MediaInfo, MediaTool};
