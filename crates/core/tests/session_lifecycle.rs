//! Session lifecycle integration tests.
//!
//! Wire the real driver, orchestrator, pipeline and courier together on
//! top of mocked externals and walk jobs through the whole lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use siphon_core::{
    config::{DeliveryConfig, SessionConfig},
    delivery::Courier,
    orchestrator::{DownloadOrchestrator, OrchestratorConfig, RetryPolicy, ScanMode},
    pipeline::{PipelineConfig, PostProcessor},
    session::{SessionDriver, SessionEvent, SessionPhase, SessionRegistry},
    testing::{discovered_item, download_status, MockAgent, MockMediaTool, MockMessenger},
    AgentError,
};

const USER: i64 = 7;
const CHAT: i64 = 70;

struct TestHarness {
    agent: Arc<MockAgent>,
    messenger: Arc<MockMessenger>,
    tool: Arc<MockMediaTool>,
    driver: SessionDriver,
    registry: Arc<SessionRegistry>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let agent = Arc::new(MockAgent::new());
        let messenger = Arc::new(MockMessenger::new());
        let tool = Arc::new(MockMediaTool::new());

        let orchestrator_config = OrchestratorConfig {
            poll_interval_ms: 10,
            poll_timeout_secs: 1,
            settle_polls: 2,
            discovery_timeout_secs: 1,
            crawl_timeout_secs: 1,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
        };
        let orchestrator = Arc::new(DownloadOrchestrator::new(orchestrator_config, agent.clone()));

        let pipeline_config = PipelineConfig {
            work_dir: temp_dir.path().join("work"),
            max_parallel: 2,
        };
        let delivery_config = DeliveryConfig::default();
        let processor = Arc::new(PostProcessor::new(
            pipeline_config,
            delivery_config.max_payload_bytes,
            tool.clone(),
        ));

        let courier = Arc::new(Courier::new(delivery_config.clone(), messenger.clone()));

        let registry = Arc::new(SessionRegistry::new(SessionConfig::default()));
        let driver = SessionDriver::new(
            orchestrator,
            processor,
            courier,
            messenger.clone(),
            Arc::clone(&registry),
            Duration::from_millis(10),
        );

        Self {
            agent,
            messenger,
            tool,
            driver,
            registry,
            temp_dir,
        }
    }

    async fn source_file(&self, name: &str, bytes: usize) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        tokio::fs::write(&path, vec![3u8; bytes]).await.unwrap();
        path
    }

    async fn phase(&self) -> Option<SessionPhase> {
        match self.registry.get(USER).await {
            Some(session) => Some(session.lock().await.phase()),
            None => None,
        }
    }

    async fn wait_for_phase(&self, expected: SessionPhase, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if self.phase().await == Some(expected) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn send(&self, event: SessionEvent) {
        self.driver
            .handle_event(USER, CHAT, event)
            .await
            .expect("event handling failed");
    }

    async fn submit_and_discover(&self, items: Vec<siphon_core::DiscoveredItem>) {
        self.agent.script_discovery(vec![items]).await;
        self.send(SessionEvent::LinkSubmitted {
            link: "https://files.example.test/pack".to_string(),
        })
        .await;
        self.send(SessionEvent::ScanChosen {
            mode: ScanMode::Regular,
        })
        .await;
        assert!(
            self.wait_for_phase(SessionPhase::AwaitingSelection, Duration::from_secs(2))
                .await,
            "discovery did not complete"
        );
    }
}

#[tokio::test]
async fn full_lifecycle_delivers_and_returns_to_idle() {
    let h = TestHarness::new();
    let movie = h.source_file("movie.mkv", 4096).await;
    let picture = h.source_file("pic.jpg", 256).await;

    h.tool.set_streamable(false).await;

    h.submit_and_discover(vec![
        discovered_item(1, "movie.mkv", 4096),
        discovered_item(2, "pic.jpg", 256),
    ])
    .await;

    let mut movie_status = download_status(1, "movie.mkv", 4096, 4096);
    movie_status.finished = true;
    movie_status.local_path = Some(movie);
    let mut picture_status = download_status(2, "pic.jpg", 256, 256);
    picture_status.finished = true;
    picture_status.local_path = Some(picture);
    h.agent.set_downloads(vec![movie_status, picture_status]).await;

    h.send(SessionEvent::SelectionConfirmed).await;
    assert!(
        h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(3)).await,
        "job did not finish"
    );

    // The video was transcoded and sent inline, the image went as an album.
    assert_eq!(h.tool.transcode_count().await, 1);
    assert_eq!(h.messenger.videos_sent().await.len(), 1);
    assert_eq!(h.messenger.albums_sent().await, vec![1]);

    // Both items were moved to the download queue and removed afterwards.
    assert_eq!(h.agent.moved().await, vec![1, 2]);
    let removed = h.agent.removed().await;
    assert!(removed.iter().any(|(ids, _)| ids == &vec![1, 2]));

    // The dashboard closed with a summary.
    let edits = h.messenger.edits_made().await;
    assert!(edits.iter().any(|(_, text)| text.starts_with("Done.")));
}

#[tokio::test]
async fn scan_prompt_follows_link_submission() {
    let h = TestHarness::new();
    h.send(SessionEvent::LinkSubmitted {
        link: "https://files.example.test/x".to_string(),
    })
    .await;

    assert_eq!(h.phase().await, Some(SessionPhase::AwaitingScanChoice));
    assert_eq!(h.messenger.scan_prompts().await, vec![CHAT]);
}

#[tokio::test]
async fn second_link_is_rejected_while_job_active() {
    let h = TestHarness::new();
    h.submit_and_discover(vec![discovered_item(1, "a.bin", 100)])
        .await;

    h.send(SessionEvent::LinkSubmitted {
        link: "https://files.example.test/other".to_string(),
    })
    .await;

    let texts = h.messenger.texts_sent().await;
    assert!(texts
        .iter()
        .any(|(_, text)| text.contains("already running")));
    assert_eq!(h.phase().await, Some(SessionPhase::AwaitingSelection));
}

#[tokio::test]
async fn empty_discovery_fails_the_job_with_a_notice() {
    let h = TestHarness::new();
    h.agent.script_discovery(vec![vec![]]).await;

    h.send(SessionEvent::LinkSubmitted {
        link: "https://files.example.test/empty".to_string(),
    })
    .await;
    h.send(SessionEvent::ScanChosen {
        mode: ScanMode::Regular,
    })
    .await;

    assert!(h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(3)).await);
    let texts = h.messenger.texts_sent().await;
    assert!(texts
        .iter()
        .any(|(_, text)| text.contains("No downloadable items")));
}

#[tokio::test]
async fn failed_job_allows_a_new_submission() {
    let h = TestHarness::new();
    h.agent.script_discovery(vec![vec![]]).await;

    h.send(SessionEvent::LinkSubmitted {
        link: "https://files.example.test/empty".to_string(),
    })
    .await;
    h.send(SessionEvent::ScanChosen {
        mode: ScanMode::Regular,
    })
    .await;
    assert!(h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(3)).await);

    // The session is usable again.
    h.submit_and_discover(vec![discovered_item(9, "b.bin", 100)])
        .await;
    assert_eq!(h.phase().await, Some(SessionPhase::AwaitingSelection));
}

#[tokio::test]
async fn toggles_and_empty_confirm_guard() {
    let h = TestHarness::new();
    h.submit_and_discover(vec![
        discovered_item(1, "a.bin", 100),
        discovered_item(2, "b.bin", 100),
    ])
    .await;

    h.send(SessionEvent::DeselectAll).await;
    h.send(SessionEvent::SelectionConfirmed).await;

    let texts = h.messenger.texts_sent().await;
    assert!(texts
        .iter()
        .any(|(_, text)| text.contains("Select at least one item")));
    assert_eq!(h.phase().await, Some(SessionPhase::AwaitingSelection));

    // Re-select one and confirm for real.
    h.send(SessionEvent::ItemToggled { item_id: 2 }).await;
    let mut status = download_status(2, "b.bin", 100, 100);
    status.finished = true;
    status.local_path = Some(h.source_file("b.bin", 100).await);
    h.agent.set_downloads(vec![status]).await;

    h.send(SessionEvent::SelectionConfirmed).await;
    assert!(h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(3)).await);
    assert_eq!(h.agent.moved().await, vec![2]);
}

#[tokio::test]
async fn cancel_during_selection_cleans_up() {
    let h = TestHarness::new();
    h.submit_and_discover(vec![discovered_item(1, "a.bin", 100)])
        .await;

    h.send(SessionEvent::Canceled).await;

    assert_eq!(h.phase().await, Some(SessionPhase::Idle));
    assert!(!h.agent.removed().await.is_empty());
    let texts = h.messenger.texts_sent().await;
    assert!(texts.iter().any(|(_, text)| text == "Canceled."));
}

#[tokio::test]
async fn cancel_during_discovery_stops_promptly() {
    let h = TestHarness::new();
    // A discovery that never produces anything keeps the scan running
    // until its deadline, so only the cancel can end it early.
    h.agent.script_discovery(vec![vec![]]).await;

    h.send(SessionEvent::LinkSubmitted {
        link: "https://files.example.test/slow".to_string(),
    })
    .await;
    h.send(SessionEvent::ScanChosen {
        mode: ScanMode::Regular,
    })
    .await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.phase().await, Some(SessionPhase::Discovering));

    h.send(SessionEvent::Canceled).await;

    // Well before the 1s discovery ceiling.
    assert!(
        h.wait_for_phase(SessionPhase::Idle, Duration::from_millis(300)).await,
        "cancel was not observed during discovery"
    );
    let texts = h.messenger.texts_sent().await;
    assert!(texts.iter().any(|(_, text)| text == "Canceled."));
    assert!(!texts
        .iter()
        .any(|(_, text)| text.contains("No downloadable items")));
}

#[tokio::test]
async fn finished_download_without_a_file_counts_as_failed() {
    let h = TestHarness::new();
    h.submit_and_discover(vec![discovered_item(1, "ghost.bin", 100)])
        .await;

    // The agent claims the item finished but never reports a local file.
    let mut status = download_status(1, "ghost.bin", 100, 100);
    status.finished = true;
    h.agent.set_downloads(vec![status]).await;

    h.send(SessionEvent::SelectionConfirmed).await;
    assert!(h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(3)).await);

    assert!(h.messenger.documents_sent().await.is_empty());
    let edits = h.messenger.edits_made().await;
    assert!(edits.iter().any(|(_, text)| {
        text.starts_with("Done. 0 file(s) delivered.") && text.contains("1 failed.")
    }));
}

#[tokio::test]
async fn transient_agent_failures_do_not_kill_the_job() {
    let h = TestHarness::new();
    let source = h.source_file("a.bin", 100).await;

    h.submit_and_discover(vec![discovered_item(1, "a.bin", 100)])
        .await;

    let mut status = download_status(1, "a.bin", 100, 100);
    status.finished = true;
    status.local_path = Some(source);
    h.agent.set_downloads(vec![status]).await;
    h.agent
        .fail_once(
            "query_downloads",
            AgentError::ConnectionFailed("reset".into()),
        )
        .await;

    h.send(SessionEvent::SelectionConfirmed).await;
    assert!(h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(3)).await);
    assert_eq!(h.messenger.documents_sent().await.len(), 1);
}

#[tokio::test]
async fn deep_scan_that_never_settles_fails_cleanly() {
    let h = TestHarness::new();
    // A list that keeps changing never settles within the 1s ceiling.
    let script: Vec<Vec<siphon_core::DiscoveredItem>> = (1i64..400)
        .map(|n| (1..=n).map(|i| discovered_item(i, "x.bin", 10)).collect())
        .collect();
    h.agent.script_discovery(script).await;

    // An unreachable local address makes the page pre-crawl fail fast and
    // fall back to submitting the link itself.
    h.send(SessionEvent::LinkSubmitted {
        link: "http://127.0.0.1:9/page".to_string(),
    })
    .await;
    h.send(SessionEvent::ScanChosen {
        mode: ScanMode::Deep,
    })
    .await;

    assert!(h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(5)).await);
    let texts = h.messenger.texts_sent().await;
    assert!(texts
        .iter()
        .any(|(_, text)| text.contains("took too long")));
}

#[tokio::test]
async fn degraded_video_arrives_as_document() {
    let h = TestHarness::new();
    let source = h.source_file("movie.avi", 2048).await;

    h.tool.set_streamable(false).await;
    h.tool.fail_transcodes(true).await;

    h.submit_and_discover(vec![discovered_item(1, "movie.avi", 2048)])
        .await;

    let mut status = download_status(1, "movie.avi", 2048, 2048);
    status.finished = true;
    status.local_path = Some(source);
    h.agent.set_downloads(vec![status]).await;

    h.send(SessionEvent::SelectionConfirmed).await;
    assert!(h.wait_for_phase(SessionPhase::Idle, Duration::from_secs(3)).await);

    assert!(h.messenger.videos_sent().await.is_empty());
    assert_eq!(h.messenger.documents_sent().await.len(), 1);
    let edits = h.messenger.edits_made().await;
    assert!(edits
        .iter()
        .any(|(_, text)| text.contains("could not be converted")));
}
