//! Scriptable in-memory download agent.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agent::{
    AgentError, DiscoveredItem, DownloadAgent, DownloadStatus, ItemId, RemoveScope,
};

/// Mock agent whose discovery responses follow a script.
///
/// `query_discovered` pops the next scripted list; once the script runs
/// out it keeps returning the last one, which is how a settled queue
/// behaves. Failures injected with `fail_once` are consumed by the next
/// call to that operation, before any scripted response.
#[derive(Default)]
pub struct MockAgent {
    discovery_script: RwLock<VecDeque<Vec<DiscoveredItem>>>,
    last_discovery: RwLock<Vec<DiscoveredItem>>,
    downloads: RwLock<Vec<DownloadStatus>>,
    moved_items: RwLock<Vec<ItemId>>,
    removed_items: RwLock<Vec<(Vec<ItemId>, RemoveScope)>>,
    added_links: RwLock<Vec<(String, bool)>>,
    call_log: RwLock<Vec<String>>,
    failures: RwLock<HashMap<String, VecDeque<AgentError>>>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script_discovery(&self, lists: Vec<Vec<DiscoveredItem>>) {
        let mut script = self.discovery_script.write().await;
        script.extend(lists);
    }

    pub async fn set_downloads(&self, downloads: Vec<DownloadStatus>) {
        *self.downloads.write().await = downloads;
    }

    pub async fn fail_once(&self, op: &str, error: AgentError) {
        self.failures
            .write()
            .await
            .entry(op.to_string())
            .or_default()
            .push_back(error);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.call_log.read().await.clone()
    }

    pub async fn moved(&self) -> Vec<ItemId> {
        self.moved_items.read().await.clone()
    }

    pub async fn removed(&self) -> Vec<(Vec<ItemId>, RemoveScope)> {
        self.removed_items.read().await.clone()
    }

    pub async fn added_links(&self) -> Vec<(String, bool)> {
        self.added_links.read().await.clone()
    }

    /// Record the call and pop an injected failure, if one is queued.
    async fn record(&self, op: &str) -> Result<(), AgentError> {
        self.call_log.write().await.push(op.to_string());
        let mut failures = self.failures.write().await;
        if let Some(queue) = failures.get_mut(op) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadAgent for MockAgent {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<(), AgentError> {
        self.record("connect").await
    }

    async fn add_link(&self, url: &str, deep_scan: bool) -> Result<(), AgentError> {
        self.record("add_link").await?;
        self.added_links
            .write()
            .await
            .push((url.to_string(), deep_scan));
        Ok(())
    }

    async fn query_discovered(&self) -> Result<Vec<DiscoveredItem>, AgentError> {
        self.record("query_discovered").await?;
        let next = self.discovery_script.write().await.pop_front();
        match next {
            Some(items) => {
                *self.last_discovery.write().await = items.clone();
                Ok(items)
            }
            None => Ok(self.last_discovery.read().await.clone()),
        }
    }

    async fn clear_discovery(&self) -> Result<(), AgentError> {
        self.record("clear_discovery").await?;
        self.last_discovery.write().await.clear();
        Ok(())
    }

    async fn move_to_downloads(&self, item_ids: &[ItemId]) -> Result<(), AgentError> {
        self.record("move_to_downloads").await?;
        self.moved_items.write().await.extend_from_slice(item_ids);
        Ok(())
    }

    async fn start_downloads(&self) -> Result<(), AgentError> {
        self.record("start_downloads").await
    }

    async fn stop_downloads(&self) -> Result<(), AgentError> {
        self.record("stop_downloads").await
    }

    async fn query_downloads(&self) -> Result<Vec<DownloadStatus>, AgentError> {
        self.record("query_downloads").await?;
        Ok(self.downloads.read().await.clone())
    }

    async fn remove(&self, item_ids: &[ItemId], scope: RemoveScope) -> Result<(), AgentError> {
        self.record("remove").await?;
        self.removed_items
            .write()
            .await
            .push((item_ids.to_vec(), scope));
        Ok(())
    }
}
