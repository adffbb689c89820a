use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Post-processing pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scratch directory; each job gets an exclusive subdirectory.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// How many items are post-processed concurrently.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/siphon")
}

fn default_max_parallel() -> usize {
    2
}
