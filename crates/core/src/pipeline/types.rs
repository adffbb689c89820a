use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a downloaded file, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Video,
    Image,
    Other,
}

const VIDEO_EXTENSIONS: [&str; 11] = [
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts",
];

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

impl FileClass {
    pub fn of(path: &std::path::Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            FileClass::Video
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            FileClass::Image
        } else {
            FileClass::Other
        }
    }
}

/// What an artifact should be delivered as.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactKind {
    /// Inline-playable video with probed metadata.
    Video {
        width: Option<u32>,
        height: Option<u32>,
        duration_secs: u64,
        thumbnail: Option<PathBuf>,
    },
    /// Image, delivered grouped into albums.
    Photo,
    /// Plain file. `degraded` marks a video that could not be transcoded
    /// and falls back to document delivery.
    Document { degraded: bool },
}

/// Whether an artifact stands alone or is one slice of a split file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Single,
    /// 1-based part numbering.
    Part { index: u32, total: u32 },
}

/// One deliverable file produced by post-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub kind: ArtifactKind,
    pub delivery: DeliveryKind,
    /// Display name, derived from the source file.
    pub caption: String,
}

/// Item-local failures. One failed item never sinks its siblings.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("downloaded file is missing: {path}")]
    SourceMissing { path: PathBuf },

    #[error("split failed: {0}")]
    Split(#[from] super::SplitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("canceled before processing started")]
    Canceled,
}

/// Post-processing outcome for one downloaded file, in submission order.
#[derive(Debug)]
pub struct ProcessedItem {
    pub source_path: PathBuf,
    pub result: Result<Vec<Artifact>, ItemError>,
}

impl ProcessedItem {
    pub fn is_degraded(&self) -> bool {
        matches!(
            &self.result,
            Ok(artifacts) if artifacts
                .iter()
                .any(|a| matches!(a.kind, ArtifactKind::Document { degraded: true }))
        )
    }
}
