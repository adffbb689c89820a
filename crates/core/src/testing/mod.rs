//! Mock implementations and fixtures for tests.

mod fixtures;
mod mock_agent;
mod mock_media_tool;
mod mock_messenger;

pub use fixtures::{discovered_item, download_status};
pub use mock_agent::MockAgent;
pub use mock_media_tool::MockMediaTool;
pub use mock_messenger::MockMessenger;
