//! My.JDownloader agent implementation.
//!
//! Talks to a JDownloader instance through the My.JDownloader relay:
//! one login yields a session token plus a device id, and every subsequent
//! call is a JSON POST against that device. The session is shared by all
//! user sessions; reconnects after a drop go through a dedicated guard so
//! concurrent callers never race duplicate logins.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

use super::{AgentError, DiscoveredItem, DownloadAgent, DownloadStatus, ItemId, RemoveScope};

/// An established relay session bound to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeviceSession {
    token: String,
    device_id: String,
}

/// My.JDownloader client.
pub struct MyJdAgent {
    client: Client,
    config: AgentConfig,
    /// Current session, None until the first connect or after a drop.
    session: RwLock<Option<DeviceSession>>,
    /// Serializes reconnect attempts only; regular calls never take it.
    reconnect_guard: Mutex<()>,
}

impl MyJdAgent {
    /// Create a new agent client. Does not connect; call [`DownloadAgent::connect`]
    /// or let the first operation connect lazily.
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| AgentError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            session: RwLock::new(None),
            reconnect_guard: Mutex::new(()),
        })
    }

    fn base_url(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    /// Perform a fresh login and device lookup.
    async fn login(&self) -> Result<DeviceSession, AgentError> {
        info!("Connecting to My.JDownloader relay");

        #[derive(Deserialize)]
        struct ConnectResponse {
            sessiontoken: String,
        }

        let url = format!("{}/my/connect", self.base_url());
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "email": self.config.email,
                "password": self.config.password,
            }))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AgentError::AuthenticationFailed(
                "relay rejected credentials".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AgentError::ApiError(format!("connect: HTTP {status}")));
        }

        let connect: ConnectResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Rejected(format!("malformed connect response: {e}")))?;

        #[derive(Deserialize)]
        struct DeviceEntry {
            id: String,
            name: String,
        }
        #[derive(Deserialize)]
        struct DeviceList {
            list: Vec<DeviceEntry>,
        }

        let url = format!(
            "{}/my/listdevices?sessiontoken={}",
            self.base_url(),
            connect.sessiontoken
        );
        let devices: DeviceList = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(map_transport_error)?
            .json()
            .await
            .map_err(|e| AgentError::Rejected(format!("malformed device list: {e}")))?;

        let device = devices
            .list
            .iter()
            .find(|d| d.name == self.config.device_name)
            .ok_or_else(|| AgentError::DeviceNotFound {
                device: self.config.device_name.clone(),
                available: devices.list.iter().map(|d| d.name.clone()).collect(),
            })?;

        info!(device = %device.name, "Connected to JDownloader device");

        Ok(DeviceSession {
            token: connect.sessiontoken,
            device_id: device.id.clone(),
        })
    }

    /// Ensure a live session exists, reconnecting if needed.
    ///
    /// `stale` is the session the caller saw fail, if any; if another task
    /// already replaced it we reuse that result instead of logging in again.
    async fn reconnect(&self, stale: Option<DeviceSession>) -> Result<DeviceSession, AgentError> {
        let _guard = self.reconnect_guard.lock().await;

        {
            let current = self.session.read().await;
            match (&*current, &stale) {
                (Some(live), Some(old)) if live != old => return Ok(live.clone()),
                (Some(live), None) => return Ok(live.clone()),
                _ => {}
            }
        }

        let fresh = self.login().await?;
        *self.session.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    async fn current_session(&self) -> Result<DeviceSession, AgentError> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }
        self.reconnect(None).await
    }

    /// POST a device endpoint, re-authenticating once on a dropped session.
    async fn device_call(&self, endpoint: &str, params: Value) -> Result<Value, AgentError> {
        let session = self.current_session().await?;

        match self.device_call_once(&session, endpoint, &params).await {
            Err(AgentError::AuthenticationFailed(_)) => {
                warn!(endpoint, "Agent session dropped, reconnecting");
                let session = self.reconnect(Some(session)).await?;
                self.device_call_once(&session, endpoint, &params).await
            }
            other => other,
        }
    }

    async fn device_call_once(
        &self,
        session: &DeviceSession,
        endpoint: &str,
        params: &Value,
    ) -> Result<Value, AgentError> {
        let url = format!(
            "{}/t_{}_{}{}",
            self.base_url(),
            session.token,
            session.device_id,
            endpoint
        );

        debug!(endpoint, "Agent call");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "params": params }))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AgentError::AuthenticationFailed(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AgentError::ApiError(format!("{endpoint}: HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Rejected(format!("malformed response body: {e}")))?;

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Validate linkgrabber rows into [`DiscoveredItem`]s.
    ///
    /// Fails fast on structurally broken rows rather than papering over them;
    /// a resolver that returns nameless links is misbehaving.
    fn parse_discovered(data: Value) -> Result<Vec<DiscoveredItem>, AgentError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct LinkRow {
            uuid: Option<ItemId>,
            name: Option<String>,
            #[serde(default)]
            bytes_total: i64,
            availability: Option<String>,
        }

        let rows: Vec<LinkRow> = serde_json::from_value(data)
            .map_err(|e| AgentError::Rejected(format!("unexpected linkgrabber shape: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let id = row
                    .uuid
                    .ok_or_else(|| AgentError::Rejected("link row without uuid".to_string()))?;
                let name = row
                    .name
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AgentError::Rejected("link row without name".to_string()))?;
                Ok(DiscoveredItem {
                    id,
                    name,
                    size_bytes: row.bytes_total.max(0) as u64,
                    availability: row.availability.unwrap_or_else(|| "UNKNOWN".to_string()),
                })
            })
            .collect()
    }

    fn parse_downloads(
        data: Value,
        package_dirs: &std::collections::HashMap<i64, PathBuf>,
    ) -> Result<Vec<DownloadStatus>, AgentError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DownloadRow {
            uuid: Option<ItemId>,
            name: Option<String>,
            #[serde(default)]
            bytes_total: i64,
            #[serde(default)]
            bytes_loaded: i64,
            #[serde(default)]
            speed: i64,
            #[serde(default)]
            eta: i64,
            #[serde(default)]
            finished: bool,
            #[serde(default)]
            running: bool,
            #[serde(alias = "packageUUID")]
            package_uuid: Option<i64>,
        }

        let rows: Vec<DownloadRow> = serde_json::from_value(data)
            .map_err(|e| AgentError::Rejected(format!("unexpected downloads shape: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let id = row
                    .uuid
                    .ok_or_else(|| AgentError::Rejected("download row without uuid".to_string()))?;
                let name = row
                    .name
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AgentError::Rejected("download row without name".to_string()))?;
                let local_path = row
                    .package_uuid
                    .and_then(|pkg| package_dirs.get(&pkg))
                    .map(|dir| dir.join(&name));
                Ok(DownloadStatus {
                    id,
                    name,
                    bytes_total: row.bytes_total.max(0) as u64,
                    bytes_loaded: row.bytes_loaded.max(0) as u64,
                    speed_bps: row.speed.max(0) as u64,
                    eta_secs: (row.eta > 0).then_some(row.eta as u64),
                    finished: row.finished,
                    running: row.running,
                    local_path,
                })
            })
            .collect()
    }
}

fn map_transport_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() {
        AgentError::Timeout
    } else if e.is_connect() {
        AgentError::ConnectionFailed(e.to_string())
    } else {
        AgentError::ApiError(e.to_string())
    }
}

#[async_trait]
impl DownloadAgent for MyJdAgent {
    fn name(&self) -> &str {
        "myjdownloader"
    }

    async fn connect(&self) -> Result<(), AgentError> {
        self.reconnect(None).await.map(|_| ())
    }

    async fn add_link(&self, url: &str, deep_scan: bool) -> Result<(), AgentError> {
        self.device_call(
            "/linkgrabberv2/addLinks",
            json!([{
                "autostart": false,
                "links": url,
                "packageName": self.config.package_name,
                "destinationFolder": self.config.download_dir,
                "overwritePackagizerRules": true,
                "deepDecrypt": deep_scan,
            }]),
        )
        .await
        .map(|_| ())
    }

    async fn query_discovered(&self) -> Result<Vec<DiscoveredItem>, AgentError> {
        let data = self
            .device_call(
                "/linkgrabberv2/queryLinks",
                json!([{
                    "bytesTotal": true,
                    "availability": true,
                    "url": true,
                }]),
            )
            .await?;
        Self::parse_discovered(data)
    }

    async fn clear_discovery(&self) -> Result<(), AgentError> {
        self.device_call("/linkgrabberv2/clearList", json!([]))
            .await
            .map(|_| ())
    }

    async fn move_to_downloads(&self, item_ids: &[ItemId]) -> Result<(), AgentError> {
        self.device_call(
            "/linkgrabberv2/moveToDownloadlist",
            json!([item_ids, []]),
        )
        .await
        .map(|_| ())
    }

    async fn start_downloads(&self) -> Result<(), AgentError> {
        self.device_call("/downloadcontroller/start", json!([]))
            .await
            .map(|_| ())
    }

    async fn stop_downloads(&self) -> Result<(), AgentError> {
        self.device_call("/downloadcontroller/stop", json!([]))
            .await
            .map(|_| ())
    }

    async fn query_downloads(&self) -> Result<Vec<DownloadStatus>, AgentError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct PackageRow {
            uuid: Option<i64>,
            save_to: Option<PathBuf>,
        }

        let packages = self
            .device_call("/downloadsV2/queryPackages", json!([{ "saveTo": true }]))
            .await?;
        let packages: Vec<PackageRow> = serde_json::from_value(packages)
            .map_err(|e| AgentError::Rejected(format!("unexpected package shape: {e}")))?;

        let package_dirs = packages
            .into_iter()
            .filter_map(|p| Some((p.uuid?, p.save_to?)))
            .collect();

        let data = self
            .device_call(
                "/downloadsV2/queryLinks",
                json!([{
                    "bytesTotal": true,
                    "bytesLoaded": true,
                    "speed": true,
                    "eta": true,
                    "finished": true,
                    "running": true,
                    "status": true,
                }]),
            )
            .await?;
        Self::parse_downloads(data, &package_dirs)
    }

    async fn remove(&self, item_ids: &[ItemId], scope: RemoveScope) -> Result<(), AgentError> {
        if item_ids.is_empty() {
            return Ok(());
        }

        self.device_call("/linkgrabberv2/removeLinks", json!([item_ids, []]))
            .await?;

        if scope == RemoveScope::All {
            self.device_call("/downloadsV2/removeLinks", json!([item_ids, []]))
                .await?;
        }

        Ok(())
    }
}
