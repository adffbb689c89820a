//! Per-user sessions and the lifecycle driver.

mod dashboard;
mod machine;
mod registry;
mod types;

pub use dashboard::DashboardView;
pub use machine::{Frontend, SessionDriver, SessionEvent};
pub use registry::SessionRegistry;
pub use types::{CandidateItem, Job, Session, SessionError, SessionPhase};
