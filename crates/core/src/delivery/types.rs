use async_trait::async_trait;
use std::path::PathBuf;

use super::DeliveryError;

/// Handle to a sent message, used for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Inline-playable video upload.
#[derive(Debug, Clone)]
pub struct VideoPayload {
    pub path: PathBuf,
    pub caption: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: u64,
    pub thumbnail: Option<PathBuf>,
}

/// Plain file upload.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    pub path: PathBuf,
    pub caption: String,
}

/// One image in a grouped album.
#[derive(Debug, Clone)]
pub struct PhotoPayload {
    pub path: PathBuf,
}

/// Trait for messaging channel backends.
///
/// Only what delivery and the dashboard need lives here; interactive
/// surfaces (keyboards, commands) belong to the frontend.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, DeliveryError>;

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), DeliveryError>;

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError>;

    async fn send_video(
        &self,
        chat_id: i64,
        video: &VideoPayload,
    ) -> Result<(), DeliveryError>;

    async fn send_document(
        &self,
        chat_id: i64,
        document: &DocumentPayload,
    ) -> Result<(), DeliveryError>;

    /// Send up to the channel's album limit of photos as one group.
    async fn send_photo_album(
        &self,
        chat_id: i64,
        photos: &[PhotoPayload],
    ) -> Result<(), DeliveryError>;
}
