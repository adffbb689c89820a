//! Configuration loading and validation.
//!
//! All configuration is read once at process start; there is no hot reload.

mod loader;
mod types;
mod validate;

use thiserror::Error;

pub use loader::{load_config, load_config_from_str};
pub use types::{AgentConfig, Config, DeliveryConfig, SessionConfig, TelegramConfig};
pub use validate::validate_config;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}
