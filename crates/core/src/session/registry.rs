//! Per-user session registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;

use super::types::Session;

/// Holds one session per user, keyed by user id.
///
/// Lookups hand out `Arc<Mutex<Session>>` so concurrent events for the
/// same user serialize on the session while different users proceed in
/// parallel. An eviction sweep drops sessions that have sat idle with no
/// active job.
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: RwLock<HashMap<i64, Arc<Mutex<Session>>>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub async fn get_or_create(&self, user_id: i64, chat_id: i64) -> Arc<Mutex<Session>> {
        let existing = {
            let sessions = self.sessions.read().await;
            sessions.get(&user_id).cloned()
        };
        if let Some(session) = existing {
            // The user may have moved to another chat since last time.
            session.lock().await.set_chat(chat_id);
            return session;
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(user_id, chat_id)))),
        )
    }

    pub async fn get(&self, user_id: i64) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// One eviction pass. Sessions with work in flight are never dropped.
    pub async fn sweep(&self) -> usize {
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let mut evicted = 0;

        let mut sessions = self.sessions.write().await;
        let user_ids: Vec<i64> = sessions.keys().copied().collect();
        for user_id in user_ids {
            let evictable = match sessions.get(&user_id) {
                Some(entry) => match entry.try_lock() {
                    Ok(session) => session.is_evictable(idle_timeout),
                    // Locked means someone is using it right now.
                    Err(_) => false,
                },
                None => false,
            };
            if evictable {
                sessions.remove(&user_id);
                evicted += 1;
                debug!(user_id, "Evicted idle session");
            }
        }

        evicted
    }

    /// Spawn the periodic eviction loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Session sweeper already running");
            return;
        }

        let registry = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(self.config.sweep_interval_secs);

        tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                "Session sweeper started"
            );
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let evicted = registry.sweep().await;
                        if evicted > 0 {
                            info!(evicted, "Session sweep complete");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Session sweeper stopped");
                        break;
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }
}
