use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentError;

/// How a submitted link is resolved into downloadable items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Hand the link to the agent as-is.
    Regular,
    /// Pre-crawl the page for embedded links and let the agent deep-decrypt
    /// each of them. Slower, finds media hidden behind indirection.
    Deep,
}

/// Errors surfaced by orchestrator operations.
///
/// Agent errors bubble through unchanged after the retry budget is spent,
/// so callers can still tell connection failures from rejections.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("discovery did not settle within {timeout_secs}s")]
    DiscoveryTimeout { timeout_secs: u64 },

    #[error("no downloadable items were found")]
    NothingFound,

    #[error("canceled while scanning")]
    Canceled,

    #[error("page scan failed: {0}")]
    ScanFailed(String),
}

impl OrchestratorError {
    /// Human-readable cause suitable for showing to the requesting user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Agent(e) if e.is_retryable() => {
                "The download agent is unreachable. Try again later.".to_string()
            }
            Self::Agent(_) => "The download agent rejected the request.".to_string(),
            Self::DiscoveryTimeout { .. } => {
                "Scanning took too long and was abandoned.".to_string()
            }
            Self::NothingFound => "No downloadable items were found.".to_string(),
            Self::Canceled => "Canceled.".to_string(),
            Self::ScanFailed(_) => "The page could not be scanned.".to_string(),
        }
    }
}
