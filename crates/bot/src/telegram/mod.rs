//! Telegram Bot API integration.

mod api;
mod types;

pub use api::TelegramClient;
pub use types::{CallbackQuery, IncomingMessage, Update};
