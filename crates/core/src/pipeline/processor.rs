//! Post-processing of completed downloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::media::MediaTool;

use super::split::split_file;
use super::types::{Artifact, ArtifactKind, DeliveryKind, FileClass, ItemError, ProcessedItem};
use super::PipelineConfig;

/// Turns downloaded files into deliverable artifacts.
///
/// Items are processed concurrently under a bounded pool; failures stay
/// item-local so one broken file never sinks the rest of the job. A failed
/// video transcode degrades that item to document delivery instead of
/// failing it.
pub struct PostProcessor {
    config: PipelineConfig,
    max_payload_bytes: u64,
    tool: Arc<dyn MediaTool>,
    semaphore: Arc<Semaphore>,
}

impl PostProcessor {
    pub fn new(
        config: PipelineConfig,
        max_payload_bytes: u64,
        tool: Arc<dyn MediaTool>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        Self {
            config,
            max_payload_bytes,
            tool,
            semaphore,
        }
    }

    /// Process every source file of a job. Results come back in submission
    /// order. When `cancel` flips, in-flight items run to completion and
    /// unstarted ones are skipped.
    pub async fn process_job(
        &self,
        job_id: &str,
        sources: &[PathBuf],
        cancel: watch::Receiver<bool>,
    ) -> Vec<ProcessedItem> {
        let work_dir = self.config.work_dir.join(job_id);

        let mut handles = Vec::with_capacity(sources.len());
        for (idx, source) in sources.iter().cloned().enumerate() {
            let tool = Arc::clone(&self.tool);
            let semaphore = Arc::clone(&self.semaphore);
            let work_dir = work_dir.clone();
            let limit = self.max_payload_bytes;
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = if *cancel.borrow() {
                    Err(ItemError::Canceled)
                } else {
                    process_one(tool.as_ref(), &work_dir, limit, &source).await
                };
                (
                    idx,
                    ProcessedItem {
                        source_path: source,
                        result,
                    },
                )
            }));
        }

        let mut items: Vec<(usize, ProcessedItem)> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok())
            .collect();
        items.sort_by_key(|(idx, _)| *idx);

        let failed = items
            .iter()
            .filter(|(_, item)| item.result.is_err())
            .count();
        info!(
            job_id,
            items = items.len(),
            failed,
            "Post-processing finished"
        );
        items.into_iter().map(|(_, item)| item).collect()
    }

    /// Remove a job's scratch directory. Safe to call more than once.
    pub async fn cleanup_job(&self, job_id: &str) {
        let dir = self.config.work_dir.join(job_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(job_id, error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

async fn process_one(
    tool: &dyn MediaTool,
    work_dir: &Path,
    limit: u64,
    source: &Path,
) -> Result<Vec<Artifact>, ItemError> {
    let meta = tokio::fs::metadata(source)
        .await
        .map_err(|_| ItemError::SourceMissing {
            path: source.to_path_buf(),
        })?;
    let caption = display_name(source);

    match FileClass::of(source) {
        FileClass::Image => {
            package(source, meta.len(), work_dir, limit, ArtifactKind::Photo, caption).await
        }
        FileClass::Other => {
            package(
                source,
                meta.len(),
                work_dir,
                limit,
                ArtifactKind::Document { degraded: false },
                caption,
            )
            .await
        }
        FileClass::Video => process_video(tool, work_dir, limit, source, caption).await,
    }
}

async fn process_video(
    tool: &dyn MediaTool,
    work_dir: &Path,
    limit: u64,
    source: &Path,
    caption: String,
) -> Result<Vec<Artifact>, ItemError> {
    // The tool writes transcodes and thumbnails into the scratch dir and
    // does not create it on its own.
    tokio::fs::create_dir_all(work_dir).await?;

    let probed = tool.probe(source).await;
    let streamable = probed.as_ref().map(|i| i.is_streamable()).unwrap_or(false);

    let playable = if streamable {
        debug!(path = %source.display(), "Already streamable, skipping transcode");
        Some(source.to_path_buf())
    } else {
        let output = work_dir.join(transcoded_name(source));
        match tool.transcode(source, &output).await {
            Ok(()) => Some(output),
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Transcode failed, delivering as document");
                None
            }
        }
    };

    let Some(playable) = playable else {
        // Degraded path: ship the original bytes as a document.
        let size = tokio::fs::metadata(source).await?.len();
        return package(
            source,
            size,
            work_dir,
            limit,
            ArtifactKind::Document { degraded: true },
            caption,
        )
        .await;
    };

    let size = tokio::fs::metadata(&playable).await?.len();
    if size > limit {
        // Too big to send inline even after transcoding.
        return package(
            &playable,
            size,
            work_dir,
            limit,
            ArtifactKind::Document { degraded: false },
            caption,
        )
        .await;
    }

    let info = if playable == source {
        probed.ok()
    } else {
        tool.probe(&playable).await.ok()
    };

    let thumbnail_path = work_dir.join(thumbnail_name(source));
    let thumbnail = match tool.thumbnail(&playable, &thumbnail_path).await {
        Ok(()) => Some(thumbnail_path),
        Err(e) => {
            debug!(path = %playable.display(), error = %e, "Thumbnail extraction failed");
            None
        }
    };

    Ok(vec![Artifact {
        path: playable,
        size_bytes: size,
        kind: ArtifactKind::Video {
            width: info.as_ref().and_then(|i| i.width),
            height: info.as_ref().and_then(|i| i.height),
            duration_secs: info.map(|i| i.duration_secs as u64).unwrap_or(0),
            thumbnail,
        },
        delivery: DeliveryKind::Single,
        caption,
    }])
}

/// Wrap a file as one artifact, or split it into part artifacts when it
/// exceeds the payload ceiling. Parts are always shipped as documents.
async fn package(
    path: &Path,
    size: u64,
    work_dir: &Path,
    limit: u64,
    kind: ArtifactKind,
    caption: String,
) -> Result<Vec<Artifact>, ItemError> {
    if size <= limit {
        return Ok(vec![Artifact {
            path: path.to_path_buf(),
            size_bytes: size,
            kind,
            delivery: DeliveryKind::Single,
            caption,
        }]);
    }

    let degraded = matches!(kind, ArtifactKind::Document { degraded: true });
    let parts = split_file(path, work_dir, limit).await?;
    let total = parts.len() as u32;

    let mut artifacts = Vec::with_capacity(parts.len());
    for (idx, part) in parts.into_iter().enumerate() {
        let part_size = tokio::fs::metadata(&part).await?.len();
        artifacts.push(Artifact {
            path: part,
            size_bytes: part_size,
            kind: ArtifactKind::Document { degraded },
            delivery: DeliveryKind::Part {
                index: idx as u32 + 1,
                total,
            },
            caption: caption.clone(),
        });
    }
    Ok(artifacts)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn transcoded_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    format!("{stem}.mp4")
}

fn thumbnail_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    format!("{stem}.thumb.jpg")
}
