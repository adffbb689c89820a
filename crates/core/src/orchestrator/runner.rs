use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use regex_lite::Regex;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::agent::{
    AgentError, DiscoveredItem, DownloadAgent, DownloadStatus, ItemId, RemoveScope,
};

use super::{with_retry, OrchestratorConfig, OrchestratorError, ScanMode};

/// Cap on links harvested from a deep-scanned page.
const MAX_SCANNED_LINKS: usize = 50;

/// Drives the download agent on behalf of all sessions.
///
/// The orchestrator owns the retry policy and the discovery settle
/// heuristic; callers see either a settled item list or a classified error.
pub struct DownloadOrchestrator {
    config: OrchestratorConfig,
    agent: Arc<dyn DownloadAgent>,
    http: reqwest::Client,
}

impl DownloadOrchestrator {
    pub fn new(config: OrchestratorConfig, agent: Arc<dyn DownloadAgent>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.crawl_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            agent,
            http,
        }
    }

    /// Establish the agent connection, retrying transient failures.
    pub async fn connect(&self) -> Result<(), OrchestratorError> {
        self.call("connect", || self.agent.connect()).await?;
        info!(agent = self.agent.name(), "Connected to download agent");
        Ok(())
    }

    /// Resolve a link into downloadable items.
    ///
    /// The discovery queue is cleared first so leftovers from an earlier
    /// job cannot leak into this one. In deep mode the page is pre-crawled
    /// and every harvested link is submitted for deep decryption; if the
    /// crawl yields nothing the original link is submitted instead.
    pub async fn discover(
        &self,
        link: &str,
        mode: ScanMode,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Vec<DiscoveredItem>, OrchestratorError> {
        self.call("clear_discovery", || self.agent.clear_discovery())
            .await?;

        let deep = mode == ScanMode::Deep;
        let urls = if deep {
            match self.scan_page(link).await {
                Ok(found) if !found.is_empty() => {
                    info!(link, count = found.len(), "Page scan found embedded links");
                    found
                }
                Ok(_) => {
                    debug!(link, "Page scan found nothing, submitting link directly");
                    vec![link.to_string()]
                }
                Err(e) => {
                    warn!(link, error = %e, "Page scan failed, submitting link directly");
                    vec![link.to_string()]
                }
            }
        } else {
            vec![link.to_string()]
        };

        for url in &urls {
            self.call("add_link", || self.agent.add_link(url, deep))
                .await?;
        }

        self.await_settled(mode, cancel).await
    }

    /// Poll the discovery queue until the result list settles.
    ///
    /// Regular scans return on the first non-empty list. Deep scans keep
    /// growing as the agent decrypts, so the list must be unchanged for
    /// `settle_polls` consecutive polls before it counts as final. A
    /// cancel signal interrupts the wait between polls.
    async fn await_settled(
        &self,
        mode: ScanMode,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Vec<DiscoveredItem>, OrchestratorError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.discovery_timeout_secs);
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut cancel = cancel.clone();

        let mut last: Vec<DiscoveredItem> = Vec::new();
        let mut unchanged = 0u32;

        loop {
            tokio::select! {
                _ = sleep(interval) => {}
                // A closed channel disables this branch; the sleep still ticks.
                Ok(()) = cancel.changed() => {}
            }
            if *cancel.borrow() {
                debug!("Discovery canceled mid-scan");
                return Err(OrchestratorError::Canceled);
            }

            let items = self
                .call("query_discovered", || self.agent.query_discovered())
                .await?;

            match mode {
                ScanMode::Regular if !items.is_empty() => return Ok(items),
                ScanMode::Deep if !items.is_empty() => {
                    if items == last {
                        unchanged += 1;
                        if unchanged >= self.config.settle_polls {
                            debug!(count = items.len(), "Discovery settled");
                            return Ok(items);
                        }
                    } else {
                        unchanged = 1;
                        last = items;
                    }
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return if last.is_empty() {
                    Err(OrchestratorError::NothingFound)
                } else {
                    Err(OrchestratorError::DiscoveryTimeout {
                        timeout_secs: self.config.discovery_timeout_secs,
                    })
                };
            }
        }
    }

    /// Re-read the discovery queue without resubmitting anything. Used to
    /// refresh a selection list that may still be growing.
    pub async fn refresh(&self) -> Result<Vec<DiscoveredItem>, OrchestratorError> {
        let items = self
            .call("query_discovered", || self.agent.query_discovered())
            .await?;
        Ok(items)
    }

    /// Drop everything from the discovery queue.
    pub async fn abort_discovery(&self) -> Result<(), OrchestratorError> {
        self.call("clear_discovery", || self.agent.clear_discovery())
            .await?;
        Ok(())
    }

    /// Move the selected items into the download queue and drop the rest
    /// from the discovery queue.
    pub async fn confirm_selection(
        &self,
        selected: &[ItemId],
        unselected: &[ItemId],
    ) -> Result<(), OrchestratorError> {
        self.call("move_to_downloads", || {
            self.agent.move_to_downloads(selected)
        })
        .await?;
        if !unselected.is_empty() {
            self.call("remove_unselected", || {
                self.agent.remove(unselected, RemoveScope::DiscoveryOnly)
            })
            .await?;
        }
        info!(
            selected = selected.len(),
            dropped = unselected.len(),
            "Selection confirmed"
        );
        Ok(())
    }

    pub async fn start(&self) -> Result<(), OrchestratorError> {
        self.call("start_downloads", || self.agent.start_downloads())
            .await?;
        Ok(())
    }

    /// Abort a job's downloads without touching other jobs on the shared
    /// queue. Removing a running link also stops its transfer.
    pub async fn cancel(&self, items: &[ItemId]) -> Result<(), OrchestratorError> {
        self.call("cancel_remove", || {
            self.agent.remove(items, RemoveScope::All)
        })
        .await?;
        info!(items = items.len(), "Job canceled on agent");
        Ok(())
    }

    /// Current download state for the given items, in the given order.
    /// Each poll has its own timeout so a hung agent call cannot stall the
    /// dashboard loop.
    pub async fn poll_progress(
        &self,
        items: &[ItemId],
    ) -> Result<Vec<DownloadStatus>, OrchestratorError> {
        let per_call = Duration::from_secs(self.config.poll_timeout_secs);
        let all = self
            .call("query_downloads", || async {
                timeout(per_call, self.agent.query_downloads())
                    .await
                    .map_err(|_| AgentError::Timeout)?
            })
            .await?;

        let wanted: HashSet<ItemId> = items.iter().copied().collect();
        let mut filtered: Vec<DownloadStatus> =
            all.into_iter().filter(|s| wanted.contains(&s.id)).collect();
        filtered.sort_by_key(|s| {
            items
                .iter()
                .position(|id| *id == s.id)
                .unwrap_or(usize::MAX)
        });
        Ok(filtered)
    }

    /// Drop a job's items from both agent queues. Idempotent; ids the
    /// agent no longer knows are ignored.
    pub async fn cleanup(&self, items: &[ItemId]) -> Result<(), OrchestratorError> {
        if items.is_empty() {
            return Ok(());
        }
        self.call("cleanup_remove", || {
            self.agent.remove(items, RemoveScope::All)
        })
        .await?;
        debug!(items = items.len(), "Agent queues cleaned up");
        Ok(())
    }

    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AgentError>>,
    {
        with_retry(&self.config.retry, op, AgentError::is_retryable, f).await
    }

    /// Fetch a page and harvest candidate links from its anchors.
    async fn scan_page(&self, url: &str) -> Result<Vec<String>, OrchestratorError> {
        let body = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OrchestratorError::ScanFailed(e.to_string()))?
            .text()
            .await
            .map_err(|e| OrchestratorError::ScanFailed(e.to_string()))?;

        Ok(harvest_links(url, &body))
    }
}

/// Extract absolute http(s) links from anchor hrefs, resolving
/// root-relative and scheme-relative ones against the page URL.
fn harvest_links(page_url: &str, html: &str) -> Vec<String> {
    let href = Regex::new(r#"href\s*=\s*["']([^"'#]+)["']"#).expect("static pattern");

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for cap in href.captures_iter(html) {
        let raw = cap[1].trim();
        let resolved = match raw {
            r if r.starts_with("http://") || r.starts_with("https://") => r.to_string(),
            r if r.starts_with("//") => format!("{}:{}", page_scheme(page_url), r),
            r if r.starts_with('/') => match page_origin(page_url) {
                Some(origin) => format!("{origin}{r}"),
                None => continue,
            },
            _ => continue,
        };
        if resolved == page_url {
            continue;
        }
        if seen.insert(resolved.clone()) {
            links.push(resolved);
            if links.len() >= MAX_SCANNED_LINKS {
                break;
            }
        }
    }
    links
}

fn page_scheme(url: &str) -> &str {
    if url.starts_with("https://") {
        "https"
    } else {
        "http"
    }
}

/// `https://host[:port]` part of the URL, without any path.
fn page_origin(url: &str) -> Option<String> {
    let rest = url.split_once("://")?;
    let host = rest.1.split('/').next()?;
    if host.is_empty() {
        return None;
    }
    Some(format!("{}://{}", rest.0, host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAgent;

    fn item(id: ItemId, name: &str) -> DiscoveredItem {
        DiscoveredItem {
            id,
            name: name.to_string(),
            size_bytes: 1024,
            availability: "ONLINE".to_string(),
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval_ms: 10,
            poll_timeout_secs: 1,
            settle_polls: 2,
            discovery_timeout_secs: 1,
            crawl_timeout_secs: 1,
            retry: super::super::RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn regular_discover_returns_first_non_empty_list() {
        let agent = Arc::new(MockAgent::new());
        agent
            .script_discovery(vec![vec![], vec![item(1, "a.mkv")]])
            .await;
        let orch = DownloadOrchestrator::new(fast_config(), agent.clone());

        let items = orch
            .discover("https://example.test/a", ScanMode::Regular, &no_cancel())
            .await
            .unwrap();
        assert_eq!(items, vec![item(1, "a.mkv")]);
        assert!(agent.calls().await.contains(&"clear_discovery".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn deep_discover_waits_for_settled_list() {
        let agent = Arc::new(MockAgent::new());
        // List grows across polls, then holds steady.
        agent
            .script_discovery(vec![
                vec![item(1, "a.mkv")],
                vec![item(1, "a.mkv"), item(2, "b.mkv")],
                vec![item(1, "a.mkv"), item(2, "b.mkv")],
                vec![item(1, "a.mkv"), item(2, "b.mkv")],
            ])
            .await;
        let orch = DownloadOrchestrator::new(fast_config(), agent);

        let items = orch.await_settled(ScanMode::Deep, &no_cancel()).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_of_nothing_reports_nothing_found() {
        let agent = Arc::new(MockAgent::new());
        agent.script_discovery(vec![vec![]]).await;
        let orch = DownloadOrchestrator::new(fast_config(), agent);

        let err = orch
            .discover("https://example.test/empty", ScanMode::Regular, &no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NothingFound));
    }

    #[tokio::test(start_paused = true)]
    async fn unsettled_deep_scan_times_out() {
        let agent = Arc::new(MockAgent::new());
        // A list that changes on every poll never settles.
        let mut script = Vec::new();
        for i in 1..200 {
            script.push((1..=i).map(|n| item(n, "x")).collect());
        }
        agent.script_discovery(script).await;
        let orch = DownloadOrchestrator::new(fast_config(), agent);

        let err = orch.await_settled(ScanMode::Deep, &no_cancel()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DiscoveryTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_an_unsettled_scan() {
        let agent = Arc::new(MockAgent::new());
        agent.script_discovery(vec![vec![item(1, "a")]]).await;
        let mut config = fast_config();
        config.settle_polls = 10_000;
        config.discovery_timeout_secs = 60;
        let orch = DownloadOrchestrator::new(config, agent);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let scan =
            tokio::spawn(async move { orch.await_settled(ScanMode::Deep, &cancel_rx).await });
        sleep(Duration::from_millis(50)).await;
        cancel_tx.send(true).unwrap();

        let err = timeout(Duration::from_secs(1), scan)
            .await
            .expect("cancel was not observed")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_agent_failure_is_retried() {
        let agent = Arc::new(MockAgent::new());
        agent
            .fail_once(
                "query_discovered",
                AgentError::ConnectionFailed("reset".into()),
            )
            .await;
        agent.script_discovery(vec![vec![item(7, "c.bin")]]).await;
        let orch = DownloadOrchestrator::new(fast_config(), agent);

        let items = orch
            .discover("https://example.test/c", ScanMode::Regular, &no_cancel())
            .await
            .unwrap();
        assert_eq!(items[0].id, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_fails_without_retry() {
        let agent = Arc::new(MockAgent::new());
        agent
            .fail_once("add_link", AgentError::Rejected("unsupported host".into()))
            .await;
        let orch = DownloadOrchestrator::new(fast_config(), agent.clone());

        let err = orch
            .discover("ftp://nope", ScanMode::Regular, &no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Agent(AgentError::Rejected(_))));
        let add_calls = agent
            .calls()
            .await
            .iter()
            .filter(|c| *c == "add_link")
            .count();
        assert_eq!(add_calls, 1);
    }

    #[tokio::test]
    async fn confirm_selection_moves_and_prunes() {
        let agent = Arc::new(MockAgent::new());
        let orch = DownloadOrchestrator::new(fast_config(), agent.clone());

        orch.confirm_selection(&[1, 2], &[3]).await.unwrap();
        let calls = agent.calls().await;
        assert!(calls.contains(&"move_to_downloads".to_string()));
        assert!(calls.contains(&"remove".to_string()));
        assert_eq!(agent.moved().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn poll_progress_filters_to_job_items() {
        let agent = Arc::new(MockAgent::new());
        agent
            .set_downloads(vec![
                crate::testing::download_status(1, "a.mkv", 100, 50),
                crate::testing::download_status(2, "b.mkv", 100, 10),
                crate::testing::download_status(9, "other.mkv", 100, 99),
            ])
            .await;
        let orch = DownloadOrchestrator::new(fast_config(), agent);

        let statuses = orch.poll_progress(&[2, 1]).await.unwrap();
        let ids: Vec<ItemId> = statuses.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn cleanup_of_nothing_is_a_no_op() {
        let agent = Arc::new(MockAgent::new());
        let orch = DownloadOrchestrator::new(fast_config(), agent.clone());
        orch.cleanup(&[]).await.unwrap();
        assert!(agent.calls().await.is_empty());
    }

    #[test]
    fn harvest_resolves_relative_links() {
        let html = r##"
            <a href="https://files.example.test/v/1">one</a>
            <a href="/v/2">two</a>
            <a href="//cdn.example.test/v/3">three</a>
            <a href="#top">anchor</a>
            <a href="javascript:void(0)">js</a>
            <a href="https://files.example.test/v/1">dup</a>
        "##;
        let links = harvest_links("https://files.example.test/page", html);
        assert_eq!(
            links,
            vec![
                "https://files.example.test/v/1",
                "https://files.example.test/v/2",
                "https://cdn.example.test/v/3",
            ]
        );
    }

    #[test]
    fn harvest_skips_the_page_itself() {
        let html = r#"<a href="https://example.test/page">self</a>"#;
        assert!(harvest_links("https://example.test/page", html).is_empty());
    }
}
