//! Download agent abstraction and the My.JDownloader implementation.
//!
//! The agent owns link resolution (the "linkgrabber" phase) and the actual
//! downloads. Everything here is a thin, typed wrapper around its API; the
//! sequencing and recovery logic lives in [`crate::orchestrator`].

mod myjd;
mod types;

pub use myjd::MyJdAgent;
pub use types::{
    AgentError, DiscoveredItem, DownloadAgent, DownloadStatus, ItemId, RemoveScope,
};
