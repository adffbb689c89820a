//! Types for download agent operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Agent-side identifier for a discovered or queued link.
pub type ItemId = i64;

/// Errors that can occur during agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Device '{device}' not found (available: {available:?})")]
    DeviceNotFound {
        device: String,
        available: Vec<String>,
    },

    /// The agent refused the request, e.g. a malformed link or a response
    /// that does not match the expected shape. Never retried.
    #[error("Agent rejected request: {0}")]
    Rejected(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

impl AgentError {
    /// Whether the operation may succeed on a retry.
    ///
    /// Connection-level failures are transient (the agent or the relay may
    /// be briefly unreachable); rejections and bad credentials are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ConnectionFailed(_) | AgentError::ApiError(_) | AgentError::Timeout
        )
    }
}

/// One downloadable file produced by the agent's discovery phase.
///
/// Agent responses are validated into this fixed shape at the boundary;
/// rows without an id or name are dropped with [`AgentError::Rejected`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    /// Agent-side link id.
    pub id: ItemId,
    /// File name as reported by the resolver.
    pub name: String,
    /// Expected size in bytes (0 if the host did not report one).
    pub size_bytes: u64,
    /// Host availability as reported by the agent ("ONLINE", "UNKNOWN", ...).
    pub availability: String,
}

/// Live state of one link in the agent's download queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadStatus {
    /// Agent-side link id.
    pub id: ItemId,
    /// File name.
    pub name: String,
    /// Total bytes (0 until the host reports it).
    pub bytes_total: u64,
    /// Bytes downloaded so far.
    pub bytes_loaded: u64,
    /// Current download speed in bytes/second.
    pub speed_bps: u64,
    /// Agent-reported ETA in seconds (None if unknown).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
    /// Whether the download has finished.
    pub finished: bool,
    /// Whether the download is actively running.
    pub running: bool,
    /// Where the agent saved (or is saving) the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl DownloadStatus {
    /// Fractional progress (0.0 - 1.0), 0.0 while the size is unknown.
    pub fn progress(&self) -> f64 {
        if self.bytes_total == 0 {
            return 0.0;
        }
        (self.bytes_loaded as f64 / self.bytes_total as f64).clamp(0.0, 1.0)
    }
}

/// How much agent-side state a removal covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveScope {
    /// Only discovery-list (linkgrabber) entries.
    DiscoveryOnly,
    /// Discovery entries and download-queue entries.
    All,
}

/// Trait for remote download agent backends.
///
/// One authenticated channel is shared by all sessions; implementations must
/// tolerate concurrent calls without serializing them behind a single lock.
#[async_trait]
pub trait DownloadAgent: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Establish (or re-establish) the connection to the agent.
    async fn connect(&self) -> Result<(), AgentError>;

    /// Submit a link to the agent's discovery queue.
    ///
    /// With `deep_scan` the agent also runs its deep-crawl/decrypt pass,
    /// which surfaces links hidden behind additional indirection.
    async fn add_link(&self, url: &str, deep_scan: bool) -> Result<(), AgentError>;

    /// List everything currently in the discovery queue.
    async fn query_discovered(&self) -> Result<Vec<DiscoveredItem>, AgentError>;

    /// Drop the entire discovery queue.
    async fn clear_discovery(&self) -> Result<(), AgentError>;

    /// Move the given discovered items into the download queue.
    async fn move_to_downloads(&self, item_ids: &[ItemId]) -> Result<(), AgentError>;

    /// Start (or resume) the download queue.
    async fn start_downloads(&self) -> Result<(), AgentError>;

    /// Stop the download queue.
    async fn stop_downloads(&self) -> Result<(), AgentError>;

    /// Current state of every link in the download queue.
    async fn query_downloads(&self) -> Result<Vec<DownloadStatus>, AgentError>;

    /// Remove the given items. Safe to call for ids the agent no longer
    /// knows; missing entries are not an error.
    async fn remove(&self, item_ids: &[ItemId], scope: RemoveScope) -> Result<(), AgentError>;
}
