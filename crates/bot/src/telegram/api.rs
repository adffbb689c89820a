//! Telegram Bot API client.
//!
//! Implements the plain messaging channel plus the interactive frontend
//! surfaces (scan prompt, selection keyboard) on top of it. Uploads are
//! streamed from disk rather than buffered.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::debug;

use siphon_core::config::TelegramConfig;
use siphon_core::delivery::{
    DeliveryError, DocumentPayload, MessageRef, Messenger, PhotoPayload, VideoPayload,
};
use siphon_core::session::{CandidateItem, Frontend};

use super::types::{
    ApiResponse, InlineKeyboardButton, InlineKeyboardMarkup, SentMessage, Update,
};

/// Longest item name shown on a selection button.
const MAX_BUTTON_NAME: usize = 48;

/// Telegram caps inline keyboards at 100 buttons; leave room for the
/// control rows. Hidden items stay toggleable via Select all / none.
const MAX_ITEM_ROWS: usize = 90;

pub struct TelegramClient {
    client: Client,
    base_url: String,
    long_poll_secs: u32,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, DeliveryError> {
        // No global timeout; long polls and large uploads outlive any
        // sensible fixed deadline. Connect timeout still applies.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            long_poll_secs: config.long_poll_secs,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, DeliveryError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": self.long_poll_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<(), DeliveryError> {
        let _: bool = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    /// POST a JSON-bodied method and unwrap the API envelope.
    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, DeliveryError> {
        let response = self
            .client
            .post(self.url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        Self::unwrap_envelope(method, response).await
    }

    /// POST a multipart method (file uploads) and unwrap the envelope.
    async fn call_multipart<T: DeserializeOwned>(
        &self,
        method: &str,
        form: Form,
    ) -> Result<T, DeliveryError> {
        let response = self
            .client
            .post(self.url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        Self::unwrap_envelope(method, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, DeliveryError> {
        let status = response.status();
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| DeliveryError::Network(format!("{method}: {e}")))?;

        if envelope.ok {
            return envelope
                .result
                .ok_or_else(|| DeliveryError::Rejected(format!("{method}: empty result")));
        }

        if let Some(retry_after_secs) = envelope.parameters.and_then(|p| p.retry_after) {
            return Err(DeliveryError::RateLimited { retry_after_secs });
        }
        let description = envelope
            .description
            .unwrap_or_else(|| format!("HTTP {status}"));
        if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE
            || description.contains("too large")
        {
            return Err(DeliveryError::PayloadTooLarge);
        }
        Err(DeliveryError::Rejected(format!("{method}: {description}")))
    }

    /// Stream a file from disk as a multipart part.
    async fn file_part(path: &Path) -> Result<Part, DeliveryError> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        Ok(Part::stream_with_length(body, length).file_name(file_name))
    }

    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &InlineKeyboardMarkup,
    ) -> Result<MessageRef, DeliveryError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat_id,
                    "text": text,
                    "reply_markup": keyboard,
                }),
            )
            .await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn edit_with_keyboard(
        &self,
        message: &MessageRef,
        text: &str,
        keyboard: &InlineKeyboardMarkup,
    ) -> Result<(), DeliveryError> {
        let result: Result<SentMessage, DeliveryError> = self
            .call(
                "editMessageText",
                &json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "text": text,
                    "reply_markup": keyboard,
                }),
            )
            .await;
        ignore_not_modified(result.map(|_| ()))
    }
}

/// Editing a message to its current content is a 400, not a failure.
fn ignore_not_modified(result: Result<(), DeliveryError>) -> Result<(), DeliveryError> {
    match result {
        Err(DeliveryError::Rejected(ref description))
            if description.contains("message is not modified") =>
        {
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, DeliveryError> {
        let sent: SentMessage = self
            .call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), DeliveryError> {
        let result: Result<SentMessage, DeliveryError> = self
            .call(
                "editMessageText",
                &json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "text": text,
                }),
            )
            .await;
        ignore_not_modified(result.map(|_| ()))
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                }),
            )
            .await?;
        Ok(())
    }

    async fn send_video(
        &self,
        chat_id: i64,
        video: &VideoPayload,
    ) -> Result<(), DeliveryError> {
        debug!(chat_id, path = %video.path.display(), "Uploading video");
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", video.caption.clone())
            .text("supports_streaming", "true")
            .text("duration", video.duration_secs.to_string())
            .part("video", Self::file_part(&video.path).await?);
        if let Some(width) = video.width {
            form = form.text("width", width.to_string());
        }
        if let Some(height) = video.height {
            form = form.text("height", height.to_string());
        }
        if let Some(ref thumbnail) = video.thumbnail {
            form = form.part("thumbnail", Self::file_part(thumbnail).await?);
        }
        let _: SentMessage = self.call_multipart("sendVideo", form).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        document: &DocumentPayload,
    ) -> Result<(), DeliveryError> {
        debug!(chat_id, path = %document.path.display(), "Uploading document");
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", document.caption.clone())
            .part("document", Self::file_part(&document.path).await?);
        let _: SentMessage = self.call_multipart("sendDocument", form).await?;
        Ok(())
    }

    async fn send_photo_album(
        &self,
        chat_id: i64,
        photos: &[PhotoPayload],
    ) -> Result<(), DeliveryError> {
        debug!(chat_id, count = photos.len(), "Uploading photo album");
        let media: Vec<_> = (0..photos.len())
            .map(|i| json!({ "type": "photo", "media": format!("attach://photo{i}") }))
            .collect();

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("media", serde_json::to_string(&media).unwrap_or_default());
        for (i, photo) in photos.iter().enumerate() {
            form = form.part(format!("photo{i}"), Self::file_part(&photo.path).await?);
        }
        let _: Vec<SentMessage> = self.call_multipart("sendMediaGroup", form).await?;
        Ok(())
    }
}

#[async_trait]
impl Frontend for TelegramClient {
    async fn prompt_scan_mode(&self, chat_id: i64) -> Result<MessageRef, DeliveryError> {
        let keyboard = InlineKeyboardMarkup {
            inline_keyboard: vec![
                vec![
                    InlineKeyboardButton::new("Regular scan", "scan:regular"),
                    InlineKeyboardButton::new("Deep scan", "scan:deep"),
                ],
                vec![InlineKeyboardButton::new("Cancel", "cancel")],
            ],
        };
        self.send_with_keyboard(chat_id, "How should this link be scanned?", &keyboard)
            .await
    }

    async fn show_selection(
        &self,
        chat_id: i64,
        existing: Option<&MessageRef>,
        items: &[CandidateItem],
    ) -> Result<MessageRef, DeliveryError> {
        let keyboard = selection_keyboard(items);
        let selected = items.iter().filter(|i| i.selected).count();
        let text = format!(
            "Found {} item(s), {} selected. Tap to toggle, then confirm.",
            items.len(),
            selected
        );

        match existing {
            Some(message) => {
                self.edit_with_keyboard(message, &text, &keyboard).await?;
                Ok(*message)
            }
            None => self.send_with_keyboard(chat_id, &text, &keyboard).await,
        }
    }
}

fn selection_keyboard(items: &[CandidateItem]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = items
        .iter()
        .take(MAX_ITEM_ROWS)
        .map(|item| {
            vec![InlineKeyboardButton::new(
                item_label(item),
                format!("item:{}", item.id),
            )]
        })
        .collect();
    if items.len() > MAX_ITEM_ROWS {
        rows.push(vec![InlineKeyboardButton::new(
            format!("…and {} more", items.len() - MAX_ITEM_ROWS),
            "noop",
        )]);
    }
    rows.push(vec![
        InlineKeyboardButton::new("Select all", "all"),
        InlineKeyboardButton::new("Select none", "none"),
        InlineKeyboardButton::new("Refresh", "refresh"),
    ]);
    rows.push(vec![
        InlineKeyboardButton::new("Download", "confirm"),
        InlineKeyboardButton::new("Cancel", "cancel"),
    ]);
    InlineKeyboardMarkup {
        inline_keyboard: rows,
    }
}

fn item_label(item: &CandidateItem) -> String {
    let mark = if item.selected { "\u{2705}" } else { "\u{2B1C}" };
    let mut name = item.name.clone();
    if name.chars().count() > MAX_BUTTON_NAME {
        name = name.chars().take(MAX_BUTTON_NAME - 1).collect();
        name.push('\u{2026}');
    }
    format!("{mark} {name} ({})", human_size(item.size_bytes))
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, name: &str, size_bytes: u64, selected: bool) -> CandidateItem {
        CandidateItem {
            id,
            name: name.to_string(),
            size_bytes,
            selected,
        }
    }

    #[test]
    fn selection_keyboard_has_item_and_control_rows() {
        let keyboard = selection_keyboard(&[
            item(1, "a.mkv", 1000, true),
            item(2, "b.jpg", 2000, false),
        ]);
        // Two item rows plus two control rows.
        assert_eq!(keyboard.inline_keyboard.len(), 4);
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "item:1");
        assert_eq!(keyboard.inline_keyboard[1][0].callback_data, "item:2");
        assert_eq!(keyboard.inline_keyboard[2].len(), 3);
        assert_eq!(keyboard.inline_keyboard[3][0].callback_data, "confirm");
    }

    #[test]
    fn oversized_lists_are_capped_with_an_overflow_row() {
        let items: Vec<_> = (0..120)
            .map(|i| item(i, &format!("f{i}.bin"), 100, true))
            .collect();
        let keyboard = selection_keyboard(&items);
        // 90 item rows, one overflow row, two control rows.
        assert_eq!(keyboard.inline_keyboard.len(), 93);
        assert_eq!(keyboard.inline_keyboard[90][0].callback_data, "noop");
        assert!(keyboard.inline_keyboard[90][0].text.contains("30 more"));
    }

    #[test]
    fn item_label_marks_selection_state() {
        assert!(item_label(&item(1, "a.mkv", 1000, true)).starts_with('\u{2705}'));
        assert!(item_label(&item(1, "a.mkv", 1000, false)).starts_with('\u{2B1C}'));
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "x".repeat(200);
        let label = item_label(&item(1, &name, 1000, true));
        assert!(label.chars().count() < 70);
        assert!(label.contains('\u{2026}'));
    }

    #[test]
    fn human_size_uses_binary_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn not_modified_edits_are_swallowed() {
        let result = ignore_not_modified(Err(DeliveryError::Rejected(
            "editMessageText: Bad Request: message is not modified".to_string(),
        )));
        assert!(result.is_ok());

        let result = ignore_not_modified(Err(DeliveryError::Rejected("other".to_string())));
        assert!(result.is_err());
    }
}
