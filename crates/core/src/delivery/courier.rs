//! Ships processed artifacts to the requesting chat.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::DeliveryConfig;
use crate::orchestrator::{with_retry, RetryPolicy};
use crate::pipeline::{Artifact, ArtifactKind, DeliveryKind, ProcessedItem};

use super::types::{DocumentPayload, Messenger, PhotoPayload, VideoPayload};
use super::DeliveryError;

/// Emitted after every artifact so the dashboard can track delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryProgress {
    pub sent: usize,
    pub total: usize,
}

/// Final tally for one job's delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliverySummary {
    pub sent: usize,
    pub failed: usize,
    /// Items shipped as documents because transcoding failed.
    pub degraded: usize,
}

/// Sends a job's artifacts in order, grouping photos into albums.
///
/// Sends are retried under the configured policy; an artifact that still
/// fails is counted and skipped so the rest of the job gets through.
pub struct Courier {
    config: DeliveryConfig,
    messenger: Arc<dyn Messenger>,
    retry: RetryPolicy,
}

impl Courier {
    pub fn new(config: DeliveryConfig, messenger: Arc<dyn Messenger>) -> Self {
        let retry = RetryPolicy {
            max_attempts: config.max_send_attempts,
            ..RetryPolicy::default()
        };
        Self {
            config,
            messenger,
            retry,
        }
    }

    pub async fn deliver(
        &self,
        chat_id: i64,
        items: &[ProcessedItem],
        progress_tx: Option<mpsc::Sender<DeliveryProgress>>,
    ) -> DeliverySummary {
        let mut summary = DeliverySummary::default();
        let total: usize = items
            .iter()
            .map(|i| i.result.as_ref().map(|a| a.len()).unwrap_or(0))
            .sum();
        let mut album: Vec<PhotoPayload> = Vec::new();

        for item in items {
            let artifacts = match &item.result {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    warn!(source = %item.source_path.display(), error = %e, "Skipping failed item");
                    summary.failed += 1;
                    continue;
                }
            };
            if item.is_degraded() {
                summary.degraded += 1;
            }

            for artifact in artifacts {
                let sent = match &artifact.kind {
                    ArtifactKind::Photo => {
                        album.push(PhotoPayload {
                            path: artifact.path.clone(),
                        });
                        if album.len() >= self.config.album_batch_size {
                            let batch = std::mem::take(&mut album);
                            self.send_album(chat_id, &batch).await.map(|()| batch.len())
                        } else {
                            // Counted when the album flushes.
                            Ok(0)
                        }
                    }
                    ArtifactKind::Video { .. } => {
                        self.send_video(chat_id, artifact).await.map(|()| 1)
                    }
                    ArtifactKind::Document { .. } => {
                        self.send_document(chat_id, artifact).await.map(|()| 1)
                    }
                };

                match sent {
                    Ok(n) => summary.sent += n,
                    Err(e) => {
                        warn!(path = %artifact.path.display(), error = %e, "Delivery failed");
                        summary.failed += 1;
                    }
                }

                if let Some(ref tx) = progress_tx {
                    let _ = tx
                        .send(DeliveryProgress {
                            sent: summary.sent,
                            total,
                        })
                        .await;
                }
            }
        }

        if !album.is_empty() {
            match self.send_album(chat_id, &album).await {
                Ok(()) => summary.sent += album.len(),
                Err(e) => {
                    warn!(error = %e, "Album delivery failed");
                    summary.failed += album.len();
                }
            }
            if let Some(ref tx) = progress_tx {
                let _ = tx
                    .send(DeliveryProgress {
                        sent: summary.sent,
                        total,
                    })
                    .await;
            }
        }

        info!(
            chat_id,
            sent = summary.sent,
            failed = summary.failed,
            degraded = summary.degraded,
            "Delivery finished"
        );
        summary
    }

    async fn send_video(&self, chat_id: i64, artifact: &Artifact) -> Result<(), DeliveryError> {
        let ArtifactKind::Video {
            width,
            height,
            duration_secs,
            thumbnail,
        } = &artifact.kind
        else {
            return Err(DeliveryError::Rejected("not a video artifact".into()));
        };
        let payload = VideoPayload {
            path: artifact.path.clone(),
            caption: artifact.caption.clone(),
            width: *width,
            height: *height,
            duration_secs: *duration_secs,
            thumbnail: thumbnail.clone(),
        };
        with_retry(&self.retry, "send_video", DeliveryError::is_retryable, || {
            self.messenger.send_video(chat_id, &payload)
        })
        .await
    }

    async fn send_document(
        &self,
        chat_id: i64,
        artifact: &Artifact,
    ) -> Result<(), DeliveryError> {
        let caption = match artifact.delivery {
            DeliveryKind::Single => artifact.caption.clone(),
            DeliveryKind::Part { index, total } => {
                format!("{} (part {}/{})", artifact.caption, index, total)
            }
        };
        let payload = DocumentPayload {
            path: artifact.path.clone(),
            caption,
        };
        with_retry(
            &self.retry,
            "send_document",
            DeliveryError::is_retryable,
            || self.messenger.send_document(chat_id, &payload),
        )
        .await
    }

    async fn send_album(
        &self,
        chat_id: i64,
        photos: &[PhotoPayload],
    ) -> Result<(), DeliveryError> {
        with_retry(&self.retry, "send_album", DeliveryError::is_retryable, || {
            self.messenger.send_photo_album(chat_id, photos)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockMessenger;
    use std::path::PathBuf;

    fn video_item(name: &str) -> ProcessedItem {
        ProcessedItem {
            source_path: PathBuf::from(format!("/w/{name}")),
            result: Ok(vec![Artifact {
                path: PathBuf::from(format!("/w/{name}")),
                size_bytes: 100,
                kind: ArtifactKind::Video {
                    width: Some(1280),
                    height: Some(720),
                    duration_secs: 60,
                    thumbnail: None,
                },
                delivery: DeliveryKind::Single,
                caption: name.to_string(),
            }]),
        }
    }

    fn photo_item(name: &str) -> ProcessedItem {
        ProcessedItem {
            source_path: PathBuf::from(format!("/w/{name}")),
            result: Ok(vec![Artifact {
                path: PathBuf::from(format!("/w/{name}")),
                size_bytes: 10,
                kind: ArtifactKind::Photo,
                delivery: DeliveryKind::Single,
                caption: name.to_string(),
            }]),
        }
    }

    fn config(album_batch: usize) -> DeliveryConfig {
        DeliveryConfig {
            album_batch_size: album_batch,
            max_send_attempts: 2,
            ..DeliveryConfig::default()
        }
    }

    #[tokio::test]
    async fn videos_are_sent_individually() {
        let messenger = Arc::new(MockMessenger::new());
        let courier = Courier::new(config(10), messenger.clone());

        let summary = courier
            .deliver(42, &[video_item("a.mp4"), video_item("b.mp4")], None)
            .await;

        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(messenger.videos_sent().await.len(), 2);
    }

    #[tokio::test]
    async fn photos_are_grouped_into_albums() {
        let messenger = Arc::new(MockMessenger::new());
        let courier = Courier::new(config(2), messenger.clone());

        let items: Vec<ProcessedItem> = (0..5).map(|i| photo_item(&format!("p{i}.jpg"))).collect();
        let summary = courier.deliver(42, &items, None).await;

        assert_eq!(summary.sent, 5);
        // Two full albums of two, one remainder album of one.
        let albums = messenger.albums_sent().await;
        assert_eq!(albums.len(), 3);
        assert_eq!(albums[0], 2);
        assert_eq!(albums[2], 1);
    }

    #[tokio::test]
    async fn part_captions_carry_numbering() {
        let messenger = Arc::new(MockMessenger::new());
        let courier = Courier::new(config(10), messenger.clone());

        let item = ProcessedItem {
            source_path: PathBuf::from("/w/big.bin"),
            result: Ok(vec![
                Artifact {
                    path: PathBuf::from("/w/big.bin.001"),
                    size_bytes: 100,
                    kind: ArtifactKind::Document { degraded: false },
                    delivery: DeliveryKind::Part { index: 1, total: 2 },
                    caption: "big.bin".to_string(),
                },
                Artifact {
                    path: PathBuf::from("/w/big.bin.002"),
                    size_bytes: 50,
                    kind: ArtifactKind::Document { degraded: false },
                    delivery: DeliveryKind::Part { index: 2, total: 2 },
                    caption: "big.bin".to_string(),
                },
            ]),
        };
        courier.deliver(42, &[item], None).await;

        let docs = messenger.documents_sent().await;
        assert_eq!(docs[0].caption, "big.bin (part 1/2)");
        assert_eq!(docs[1].caption, "big.bin (part 2/2)");
    }

    #[tokio::test]
    async fn failed_send_does_not_block_rest() {
        let messenger = Arc::new(MockMessenger::new());
        messenger
            .fail_next_video(DeliveryError::Rejected("bad".into()))
            .await;
        let courier = Courier::new(config(10), messenger.clone());

        let summary = courier
            .deliver(42, &[video_item("a.mp4"), video_item("b.mp4")], None)
            .await;

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn transient_send_failures_are_retried() {
        let messenger = Arc::new(MockMessenger::new());
        messenger
            .fail_next_video(DeliveryError::Network("reset".into()))
            .await;
        let courier = Courier::new(config(10), messenger.clone());

        let summary = courier.deliver(42, &[video_item("a.mp4")], None).await;
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn degraded_items_are_counted() {
        let messenger = Arc::new(MockMessenger::new());
        let courier = Courier::new(config(10), messenger);

        let item = ProcessedItem {
            source_path: PathBuf::from("/w/movie.avi"),
            result: Ok(vec![Artifact {
                path: PathBuf::from("/w/movie.avi"),
                size_bytes: 100,
                kind: ArtifactKind::Document { degraded: true },
                delivery: DeliveryKind::Single,
                caption: "movie.avi".to_string(),
            }]),
        };
        let summary = courier.deliver(42, &[item], None).await;
        assert_eq!(summary.degraded, 1);
    }

    #[tokio::test]
    async fn progress_reaches_total() {
        let messenger = Arc::new(MockMessenger::new());
        let courier = Courier::new(config(10), messenger);
        let (tx, mut rx) = mpsc::channel(16);

        courier
            .deliver(42, &[video_item("a.mp4"), video_item("b.mp4")], Some(tx))
            .await;

        let mut last = None;
        while let Ok(p) = rx.try_recv() {
            last = Some(p);
        }
        assert_eq!(last, Some(DeliveryProgress { sent: 2, total: 2 }));
    }
}
