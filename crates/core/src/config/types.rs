use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::media::MediaConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::PipelineConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Telegram collaborator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: String,
    /// Allow-list of user ids permitted to drive the bot.
    pub authorized_users: Vec<i64>,
    /// Bot API base URL (override for local Bot API servers).
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
    /// Long-poll timeout in seconds.
    #[serde(default = "default_long_poll_secs")]
    pub long_poll_secs: u32,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_long_poll_secs() -> u32 {
    30
}

/// Download agent (My.JDownloader) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// My.JDownloader account email.
    pub email: String,
    /// My.JDownloader account password.
    pub password: String,
    /// Which device to drive (a single account can expose several).
    pub device_name: String,
    /// Download directory on the agent host.
    pub download_dir: String,
    /// Package name used for links added by this bot.
    #[serde(default = "default_package_name")]
    pub package_name: String,
    /// Relay API base URL.
    #[serde(default = "default_agent_api")]
    pub api_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u32,
}

fn default_package_name() -> String {
    "siphon".to_string()
}

fn default_agent_api() -> String {
    "https://api.jdownloader.org".to_string()
}

fn default_agent_timeout() -> u32 {
    30
}

/// Session registry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Idle sessions are evicted after this many seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// How often the eviction sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    60
}

/// Delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Maximum single-payload size the channel accepts; larger artifacts
    /// are split into byte-range parts under this ceiling.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// Grouped-media batch size (channel limit).
    #[serde(default = "default_album_batch")]
    pub album_batch_size: usize,
    /// Bounded retries for a failed send before the item is marked failed.
    #[serde(default = "default_send_attempts")]
    pub max_send_attempts: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            album_batch_size: default_album_batch(),
            max_send_attempts: default_send_attempts(),
        }
    }
}

fn default_max_payload_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn default_album_batch() -> usize {
    10
}

fn default_send_attempts() -> u32 {
    3
}

/// Working directory helper: each job gets an exclusive subdirectory.
impl Config {
    pub fn job_work_dir(&self, job_id: &str) -> PathBuf {
        self.pipeline.work_dir.join(job_id)
    }
}
