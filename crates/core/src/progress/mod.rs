//! Progress sampling and dashboard text rendering.

mod render;
mod sampler;

pub use render::{format_duration, format_size, progress_bar, render_dashboard};
pub use sampler::{ProgressSample, ProgressSampler, SpeedSmoother};
