pub mod agent;
pub mod config;
pub mod delivery;
pub mod media;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod testing;

pub use agent::{AgentError, DiscoveredItem, DownloadAgent, DownloadStatus, MyJdAgent};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use delivery::{Courier, DeliveryError, Messenger};
pub use media::{FfmpegTool, MediaTool};
pub use orchestrator::{DownloadOrchestrator, OrchestratorError, ScanMode};
pub use pipeline::PostProcessor;
pub use session::{Frontend, SessionDriver, SessionEvent, SessionRegistry};
