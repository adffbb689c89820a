//! Download orchestration around the remote agent.
//!
//! Every public operation wraps one or more agent calls with a uniform
//! retry policy: connection-level failures are retried with bounded
//! exponential backoff, rejections fail immediately.

mod config;
mod retry;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use retry::{with_retry, RetryPolicy};
pub use runner::DownloadOrchestrator;
pub use types::{OrchestratorError, ScanMode};
