use serde::{Deserialize, Serialize};

use super::RetryPolicy;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Progress and discovery poll interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-call timeout for agent polls.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// A deep-scan result list counts as settled once it has been
    /// unchanged for this many consecutive polls.
    #[serde(default = "default_settle_polls")]
    pub settle_polls: u32,
    /// Hard ceiling for discovery, settled or not.
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    /// Timeout for the deep-scan page fetch.
    #[serde(default = "default_crawl_timeout_secs")]
    pub crawl_timeout_secs: u64,
    /// Retry policy applied to every agent call.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            settle_polls: default_settle_polls(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            crawl_timeout_secs: default_crawl_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_settle_polls() -> u32 {
    3
}

fn default_discovery_timeout_secs() -> u64 {
    120
}

fn default_crawl_timeout_secs() -> u64 {
    15
}
