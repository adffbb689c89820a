//! In-memory messaging channel recording everything it is asked to send.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::delivery::{
    DeliveryError, DocumentPayload, MessageRef, Messenger, PhotoPayload, VideoPayload,
};
use crate::session::{CandidateItem, Frontend};

#[derive(Default)]
pub struct MockMessenger {
    next_message_id: AtomicI64,
    texts: RwLock<Vec<(i64, String)>>,
    edits: RwLock<Vec<(MessageRef, String)>>,
    deleted: RwLock<Vec<MessageRef>>,
    videos: RwLock<Vec<VideoPayload>>,
    documents: RwLock<Vec<DocumentPayload>>,
    albums: RwLock<Vec<usize>>,
    selections: RwLock<Vec<Vec<CandidateItem>>>,
    scan_prompts: RwLock<Vec<i64>>,
    video_failures: RwLock<VecDeque<DeliveryError>>,
    document_failures: RwLock<VecDeque<DeliveryError>>,
    album_failures: RwLock<VecDeque<DeliveryError>>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn texts_sent(&self) -> Vec<(i64, String)> {
        self.texts.read().await.clone()
    }

    pub async fn edits_made(&self) -> Vec<(MessageRef, String)> {
        self.edits.read().await.clone()
    }

    pub async fn deleted_messages(&self) -> Vec<MessageRef> {
        self.deleted.read().await.clone()
    }

    pub async fn videos_sent(&self) -> Vec<VideoPayload> {
        self.videos.read().await.clone()
    }

    pub async fn documents_sent(&self) -> Vec<DocumentPayload> {
        self.documents.read().await.clone()
    }

    /// Sizes of the albums sent, in order.
    pub async fn albums_sent(&self) -> Vec<usize> {
        self.albums.read().await.clone()
    }

    pub async fn selections_shown(&self) -> Vec<Vec<CandidateItem>> {
        self.selections.read().await.clone()
    }

    pub async fn scan_prompts(&self) -> Vec<i64> {
        self.scan_prompts.read().await.clone()
    }

    pub async fn fail_next_video(&self, error: DeliveryError) {
        self.video_failures.write().await.push_back(error);
    }

    pub async fn fail_next_document(&self, error: DeliveryError) {
        self.document_failures.write().await.push_back(error);
    }

    pub async fn fail_next_album(&self, error: DeliveryError) {
        self.album_failures.write().await.push_back(error);
    }

    fn next_ref(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, DeliveryError> {
        self.texts.write().await.push((chat_id, text.to_string()));
        Ok(self.next_ref(chat_id))
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), DeliveryError> {
        self.edits.write().await.push((*message, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        self.deleted.write().await.push(*message);
        Ok(())
    }

    async fn send_video(
        &self,
        _chat_id: i64,
        video: &VideoPayload,
    ) -> Result<(), DeliveryError> {
        if let Some(error) = self.video_failures.write().await.pop_front() {
            return Err(error);
        }
        self.videos.write().await.push(video.clone());
        Ok(())
    }

    async fn send_document(
        &self,
        _chat_id: i64,
        document: &DocumentPayload,
    ) -> Result<(), DeliveryError> {
        if let Some(error) = self.document_failures.write().await.pop_front() {
            return Err(error);
        }
        self.documents.write().await.push(document.clone());
        Ok(())
    }

    async fn send_photo_album(
        &self,
        _chat_id: i64,
        photos: &[PhotoPayload],
    ) -> Result<(), DeliveryError> {
        if let Some(error) = self.album_failures.write().await.pop_front() {
            return Err(error);
        }
        self.albums.write().await.push(photos.len());
        Ok(())
    }
}

#[async_trait]
impl Frontend for MockMessenger {
    async fn prompt_scan_mode(&self, chat_id: i64) -> Result<MessageRef, DeliveryError> {
        self.scan_prompts.write().await.push(chat_id);
        Ok(self.next_ref(chat_id))
    }

    async fn show_selection(
        &self,
        chat_id: i64,
        existing: Option<&MessageRef>,
        items: &[CandidateItem],
    ) -> Result<MessageRef, DeliveryError> {
        self.selections.write().await.push(items.to_vec());
        match existing {
            Some(message) => Ok(*message),
            None => Ok(self.next_ref(chat_id)),
        }
    }
}
