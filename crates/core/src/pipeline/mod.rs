//! Post-processing pipeline: classify, transcode, split, thumbnail.

mod config;
mod processor;
mod split;
mod types;

pub use config::PipelineConfig;
pub use processor::PostProcessor;
pub use split::{plan_parts, split_file, SplitError};
pub use types::{Artifact, ArtifactKind, DeliveryKind, FileClass, ItemError, ProcessedItem};
