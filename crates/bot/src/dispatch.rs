//! Routes incoming updates to per-user sessions.
//!
//! Every update passes the allow-list first. Unauthorized messages get a
//! short notice; unauthorized callback presses are dropped silently so
//! strangers cannot probe the bot through old keyboards.

use std::sync::Arc;

use regex_lite::Regex;
use tracing::{debug, warn};

use siphon_core::orchestrator::ScanMode;
use siphon_core::Messenger;
use siphon_core::session::{SessionDriver, SessionEvent};

use crate::telegram::{CallbackQuery, IncomingMessage, TelegramClient, Update};

const HELP_TEXT: &str = "Send me a link and I will fetch its media for you.\n\
    /cancel stops the current job.";

pub struct Dispatcher {
    driver: SessionDriver,
    client: Arc<TelegramClient>,
    authorized_users: Vec<i64>,
    link_pattern: Regex,
}

impl Dispatcher {
    pub fn new(
        driver: SessionDriver,
        client: Arc<TelegramClient>,
        authorized_users: Vec<i64>,
    ) -> Self {
        Self {
            driver,
            client,
            authorized_users,
            link_pattern: Regex::new(r"https?://\S+").expect("Invalid link pattern"),
        }
    }

    fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_users.contains(&user_id)
    }

    pub async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
        }
    }

    async fn handle_message(&self, message: IncomingMessage) {
        let Some(user) = message.from else {
            return;
        };
        let chat_id = message.chat.id;

        if !self.is_authorized(user.id) {
            warn!(user_id = user.id, "Unauthorized message");
            let _ = self
                .client
                .send_text(chat_id, "You are not on the allow-list for this bot.")
                .await;
            return;
        }

        let Some(text) = message.text else {
            return;
        };

        let event = if text.starts_with("/cancel") {
            Some(SessionEvent::Canceled)
        } else if text.starts_with("/start") || text.starts_with("/help") {
            let _ = self.client.send_text(chat_id, HELP_TEXT).await;
            None
        } else if let Some(link) = self.extract_link(&text) {
            Some(SessionEvent::LinkSubmitted { link })
        } else {
            let _ = self
                .client
                .send_text(chat_id, "That does not look like a link.")
                .await;
            None
        };

        if let Some(event) = event {
            self.dispatch(user.id, chat_id, event).await;
        }
    }

    async fn handle_callback(&self, callback: CallbackQuery) {
        // Always acknowledge so the client stops its spinner.
        if let Err(e) = self.client.answer_callback_query(&callback.id).await {
            debug!(error = %e, "Failed to answer callback query");
        }

        if !self.is_authorized(callback.from.id) {
            warn!(user_id = callback.from.id, "Unauthorized callback press");
            return;
        }

        let Some(chat_id) = callback.message.map(|m| m.chat.id) else {
            return;
        };
        let Some(event) = callback.data.as_deref().and_then(parse_callback) else {
            debug!(data = ?callback.data, "Unrecognized callback data");
            return;
        };

        self.dispatch(callback.from.id, chat_id, event).await;
    }

    async fn dispatch(&self, user_id: i64, chat_id: i64, event: SessionEvent) {
        if let Err(e) = self.driver.handle_event(user_id, chat_id, event).await {
            warn!(user_id, error = %e, "Failed to handle session event");
        }
    }

    fn extract_link(&self, text: &str) -> Option<String> {
        self.link_pattern
            .find(text)
            .map(|m| m.as_str().to_string())
    }
}

/// Map keyboard callback data onto session events.
fn parse_callback(data: &str) -> Option<SessionEvent> {
    match data {
        "scan:regular" => Some(SessionEvent::ScanChosen {
            mode: ScanMode::Regular,
        }),
        "scan:deep" => Some(SessionEvent::ScanChosen {
            mode: ScanMode::Deep,
        }),
        "all" => Some(SessionEvent::SelectAll),
        "none" => Some(SessionEvent::DeselectAll),
        "refresh" => Some(SessionEvent::SelectionRefreshed),
        "confirm" => Some(SessionEvent::SelectionConfirmed),
        "cancel" => Some(SessionEvent::Canceled),
        _ => data
            .strip_prefix("item:")
            .and_then(|id| id.parse().ok())
            .map(|item_id| SessionEvent::ItemToggled { item_id }),
    }
}
