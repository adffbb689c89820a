//! Drives sessions through the job lifecycle.
//!
//! The session itself is a pure state machine; everything with I/O in it
//! (agent calls, post-processing, message sends) happens here, in spawned
//! tasks that re-lock the session only to transition it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use crate::agent::ItemId;
use crate::delivery::{Courier, DeliveryError, MessageRef, Messenger};
use crate::orchestrator::{DownloadOrchestrator, ScanMode};
use crate::pipeline::PostProcessor;
use crate::progress::ProgressSampler;

use super::dashboard::DashboardView;
use super::registry::SessionRegistry;
use super::types::{CandidateItem, Session, SessionError, SessionPhase};

/// Interactive surface on top of the plain messaging channel.
///
/// The driver talks to users exclusively through this trait; how the scan
/// prompt and the selection list are rendered is the frontend's business.
#[async_trait]
pub trait Frontend: Messenger {
    /// Ask which scan mode to use for a just-submitted link.
    async fn prompt_scan_mode(&self, chat_id: i64) -> Result<MessageRef, DeliveryError>;

    /// Show (or update) the item selection list.
    async fn show_selection(
        &self,
        chat_id: i64,
        existing: Option<&MessageRef>,
        items: &[CandidateItem],
    ) -> Result<MessageRef, DeliveryError>;
}

/// User actions routed into the lifecycle.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    LinkSubmitted { link: String },
    ScanChosen { mode: ScanMode },
    ItemToggled { item_id: ItemId },
    SelectAll,
    DeselectAll,
    SelectionRefreshed,
    SelectionConfirmed,
    Canceled,
}

#[derive(Clone)]
pub struct SessionDriver {
    orchestrator: Arc<DownloadOrchestrator>,
    processor: Arc<PostProcessor>,
    courier: Arc<Courier>,
    frontend: Arc<dyn Frontend>,
    registry: Arc<SessionRegistry>,
    poll_interval: Duration,
}

type SharedSession = Arc<Mutex<Session>>;

impl SessionDriver {
    pub fn new(
        orchestrator: Arc<DownloadOrchestrator>,
        processor: Arc<PostProcessor>,
        courier: Arc<Courier>,
        frontend: Arc<dyn Frontend>,
        registry: Arc<SessionRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            processor,
            courier,
            frontend,
            registry,
            poll_interval,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Route one user event. Guard violations turn into user-facing
    /// notices, not errors; only channel failures propagate.
    pub async fn handle_event(
        &self,
        user_id: i64,
        chat_id: i64,
        event: SessionEvent,
    ) -> Result<(), DeliveryError> {
        let session = self.registry.get_or_create(user_id, chat_id).await;

        match event {
            SessionEvent::LinkSubmitted { link } => {
                let accepted = session.lock().await.submit_link(link);
                match accepted {
                    Ok(()) => {
                        self.frontend.prompt_scan_mode(chat_id).await?;
                    }
                    Err(SessionError::JobActive) => {
                        self.frontend
                            .send_text(
                                chat_id,
                                "A job is already running. Cancel it before submitting a new link.",
                            )
                            .await?;
                    }
                    Err(e) => self.notify_guard(chat_id, e).await?,
                }
            }

            SessionEvent::ScanChosen { mode } => {
                let chosen = session.lock().await.choose_mode(mode);
                match chosen {
                    Ok(()) => {
                        let driver = self.clone();
                        tokio::spawn(async move {
                            driver.run_discovery(session, chat_id).await;
                        });
                    }
                    Err(e) => self.notify_guard(chat_id, e).await?,
                }
            }

            SessionEvent::ItemToggled { item_id } => {
                let toggled = session.lock().await.toggle_item(item_id);
                match toggled {
                    Ok(()) => self.redraw_selection(&session, chat_id).await?,
                    Err(SessionError::UnknownItem(_)) => {
                        // Stale callback from an old list; redraw settles it.
                        self.redraw_selection(&session, chat_id).await?;
                    }
                    Err(e) => self.notify_guard(chat_id, e).await?,
                }
            }

            SessionEvent::SelectAll | SessionEvent::DeselectAll => {
                let selected = matches!(event, SessionEvent::SelectAll);
                let changed = session.lock().await.set_all(selected);
                match changed {
                    Ok(()) => self.redraw_selection(&session, chat_id).await?,
                    Err(e) => self.notify_guard(chat_id, e).await?,
                }
            }

            SessionEvent::SelectionRefreshed => {
                match self.orchestrator.refresh().await {
                    Ok(items) => {
                        let refreshed = session.lock().await.refresh_candidates(items);
                        match refreshed {
                            Ok(()) => self.redraw_selection(&session, chat_id).await?,
                            Err(e) => self.notify_guard(chat_id, e).await?,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Selection refresh failed");
                        self.frontend
                            .send_text(chat_id, &e.user_message())
                            .await?;
                    }
                }
            }

            SessionEvent::SelectionConfirmed => {
                let confirmed = session.lock().await.confirm();
                match confirmed {
                    Ok((selected, unselected)) => {
                        let driver = self.clone();
                        tokio::spawn(async move {
                            driver
                                .run_job(session, chat_id, selected, unselected)
                                .await;
                        });
                    }
                    Err(SessionError::EmptySelection) => {
                        self.frontend
                            .send_text(chat_id, "Select at least one item first.")
                            .await?;
                    }
                    Err(e) => self.notify_guard(chat_id, e).await?,
                }
            }

            SessionEvent::Canceled => {
                self.handle_cancel(session, chat_id).await?;
            }
        }

        Ok(())
    }

    async fn notify_guard(&self, chat_id: i64, e: SessionError) -> Result<(), DeliveryError> {
        self.frontend
            .send_text(chat_id, &format!("That action is not available now ({e})."))
            .await?;
        Ok(())
    }

    async fn redraw_selection(
        &self,
        session: &SharedSession,
        chat_id: i64,
    ) -> Result<(), DeliveryError> {
        let (items, existing) = {
            let guard = session.lock().await;
            match guard.job() {
                Some(job) => (job.candidates.clone(), job.dashboard),
                None => return Ok(()),
            }
        };
        let message = self
            .frontend
            .show_selection(chat_id, existing.as_ref(), &items)
            .await?;
        if let Some(job) = session.lock().await.job_mut() {
            job.dashboard = Some(message);
        }
        Ok(())
    }

    async fn handle_cancel(
        &self,
        session: SharedSession,
        chat_id: i64,
    ) -> Result<(), DeliveryError> {
        let (phase, signaled) = {
            let mut guard = session.lock().await;
            let phase = guard.phase();
            let signaled = guard.request_cancel();
            (phase, signaled)
        };

        match phase {
            SessionPhase::Idle => {
                self.frontend
                    .send_text(chat_id, "Nothing to cancel.")
                    .await?;
            }
            SessionPhase::AwaitingScanChoice => {
                self.frontend.send_text(chat_id, "Canceled.").await?;
            }
            // No background task is watching these phases; tear down here.
            SessionPhase::AwaitingSelection | SessionPhase::QueuedForDownload => {
                let item_ids: Vec<ItemId> = {
                    let guard = session.lock().await;
                    guard
                        .job()
                        .map(|j| j.candidates.iter().map(|c| c.id).collect())
                        .unwrap_or_default()
                };
                if let Err(e) = self.orchestrator.cleanup(&item_ids).await {
                    warn!(error = %e, "Agent cleanup after cancel failed");
                }
                session.lock().await.finish();
                self.frontend.send_text(chat_id, "Canceled.").await?;
            }
            // The running task observes the cancel signal and tears down.
            _ => {
                if signaled {
                    info!(phase = %phase, "Cancel requested, job will stop shortly");
                }
            }
        }
        Ok(())
    }

    async fn run_discovery(&self, session: SharedSession, chat_id: i64) {
        let (link, mode, cancel) = {
            let guard = session.lock().await;
            match guard.job() {
                Some(job) => (job.link.clone(), job.mode, job.cancel_handle()),
                None => return,
            }
        };

        let notice = self
            .frontend
            .send_text(chat_id, "Scanning link\u{2026}")
            .await
            .ok();

        let outcome = self.orchestrator.discover(&link, mode, &cancel).await;

        if let Some(ref notice) = notice {
            let _ = self.frontend.delete_message(notice).await;
        }

        if *cancel.borrow() {
            if let Err(e) = self.orchestrator.abort_discovery().await {
                warn!(error = %e, "Discovery abort failed");
            }
            session.lock().await.finish();
            let _ = self.frontend.send_text(chat_id, "Canceled.").await;
            return;
        }

        match outcome {
            Ok(items) => {
                info!(chat_id, count = items.len(), "Discovery complete");
                if session.lock().await.discovered(items).is_err() {
                    return;
                }
                if let Err(e) = self.redraw_selection(&session, chat_id).await {
                    error!(error = %e, "Failed to show selection list");
                }
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Discovery failed");
                session.lock().await.finish();
                let _ = self.frontend.send_text(chat_id, &e.user_message()).await;
            }
        }
    }

    async fn run_job(
        &self,
        session: SharedSession,
        chat_id: i64,
        selected: Vec<ItemId>,
        unselected: Vec<ItemId>,
    ) {
        let (job_id, dashboard, cancel) = {
            let guard = session.lock().await;
            match guard.job() {
                Some(job) => (job.id.clone(), job.dashboard, job.cancel_handle()),
                None => return,
            }
        };

        if let Err(e) = self.start_downloads(&selected, &unselected).await {
            self.fail_job(&session, chat_id, &e, &selected, &job_id).await;
            return;
        }
        session.lock().await.advance(SessionPhase::Downloading);

        let dashboard = match self.ensure_dashboard(chat_id, dashboard).await {
            Some(d) => d,
            None => {
                self.fail_job(
                    &session,
                    chat_id,
                    "The progress message could not be created.",
                    &selected,
                    &job_id,
                )
                .await;
                return;
            }
        };

        let view = Arc::new(Mutex::new((DashboardView::default(), String::new())));

        let final_statuses = match self
            .monitor_downloads(&selected, &cancel, &dashboard, &view)
            .await
        {
            Ok(Some(statuses)) => statuses,
            Ok(None) => {
                self.teardown_canceled(&session, chat_id, &selected, &job_id, &dashboard)
                    .await;
                return;
            }
            Err(message) => {
                self.fail_job(&session, chat_id, &message, &selected, &job_id)
                    .await;
                return;
            }
        };

        // Post-processing
        session.lock().await.advance(SessionPhase::PostProcessing);
        {
            let mut guard = view.lock().await;
            guard.0.set_processing();
            let text = guard.0.compose();
            self.edit_if_changed(&dashboard, &mut guard.1, text).await;
        }

        let sources: Vec<PathBuf> = final_statuses
            .iter()
            .filter_map(|s| s.local_path.clone())
            .collect();
        // The agent can report an item finished without telling us where
        // the file landed; those items cannot be delivered.
        let unfetched = final_statuses.len() - sources.len();
        if unfetched > 0 {
            warn!(chat_id, job_id, unfetched, "Finished items reported no local file");
        }
        let items = self
            .processor
            .process_job(&job_id, &sources, cancel.clone())
            .await;

        if *cancel.borrow() {
            self.teardown_canceled(&session, chat_id, &selected, &job_id, &dashboard)
                .await;
            return;
        }

        // Delivery
        session.lock().await.advance(SessionPhase::Delivering);
        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let updater = {
            let driver = self.clone();
            let view = Arc::clone(&view);
            let dashboard = dashboard;
            tokio::spawn(async move {
                while let Some(progress) = progress_rx.recv().await {
                    let mut guard = view.lock().await;
                    guard.0.set_delivery(progress);
                    let text = guard.0.compose();
                    driver.edit_if_changed(&dashboard, &mut guard.1, text).await;
                }
            })
        };

        let summary = self.courier.deliver(chat_id, &items, Some(progress_tx)).await;
        let _ = updater.await;

        let mut closing = format!("Done. {} file(s) delivered.", summary.sent);
        if summary.degraded > 0 {
            closing.push_str(&format!(
                " {} could not be converted and arrived as documents.",
                summary.degraded
            ));
        }
        let failed = summary.failed + unfetched;
        if failed > 0 {
            closing.push_str(&format!(" {failed} failed."));
        }
        let _ = self.frontend.edit_text(&dashboard, &closing).await;

        self.cleanup(&selected, &job_id).await;
        session.lock().await.finish();
        info!(chat_id, job_id, "Job complete");
    }

    async fn start_downloads(
        &self,
        selected: &[ItemId],
        unselected: &[ItemId],
    ) -> Result<(), String> {
        self.orchestrator
            .confirm_selection(selected, unselected)
            .await
            .map_err(|e| e.user_message())?;
        self.orchestrator.start().await.map_err(|e| e.user_message())
    }

    async fn ensure_dashboard(
        &self,
        chat_id: i64,
        existing: Option<MessageRef>,
    ) -> Option<MessageRef> {
        match existing {
            Some(message) => Some(message),
            None => self
                .frontend
                .send_text(chat_id, "Starting\u{2026}")
                .await
                .ok(),
        }
    }

    /// Poll until every download finishes. Returns None when canceled.
    async fn monitor_downloads(
        &self,
        selected: &[ItemId],
        cancel: &watch::Receiver<bool>,
        dashboard: &MessageRef,
        view: &Arc<Mutex<(DashboardView, String)>>,
    ) -> Result<Option<Vec<crate::agent::DownloadStatus>>, String> {
        let mut sampler = ProgressSampler::new();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if *cancel.borrow() {
                return Ok(None);
            }

            let statuses = self
                .orchestrator
                .poll_progress(selected)
                .await
                .map_err(|e| e.user_message())?;

            let sample = sampler.sample(&statuses);
            let done = sample.all_finished();
            {
                let mut guard = view.lock().await;
                guard.0.set_download(sample);
                let text = guard.0.compose();
                self.edit_if_changed(dashboard, &mut guard.1, text).await;
            }
            if done {
                return Ok(Some(statuses));
            }
        }
    }

    /// Edit the dashboard only when the text actually changed, so polls
    /// that observe no movement cost no channel calls.
    async fn edit_if_changed(&self, message: &MessageRef, last: &mut String, text: String) {
        if text == *last {
            return;
        }
        match self.frontend.edit_text(message, &text).await {
            Ok(()) => *last = text,
            Err(e) => warn!(error = %e, "Dashboard edit failed"),
        }
    }

    async fn fail_job(
        &self,
        session: &SharedSession,
        chat_id: i64,
        message: &str,
        selected: &[ItemId],
        job_id: &str,
    ) {
        warn!(chat_id, job_id, message, "Job failed");
        self.cleanup(selected, job_id).await;
        session.lock().await.finish();
        let _ = self
            .frontend
            .send_text(chat_id, &format!("Job failed: {message}"))
            .await;
    }

    async fn teardown_canceled(
        &self,
        session: &SharedSession,
        chat_id: i64,
        selected: &[ItemId],
        job_id: &str,
        dashboard: &MessageRef,
    ) {
        info!(chat_id, job_id, "Job canceled");
        if let Err(e) = self.orchestrator.cancel(selected).await {
            warn!(error = %e, "Agent cancel failed");
        }
        self.processor.cleanup_job(job_id).await;
        session.lock().await.finish();
        let _ = self.frontend.edit_text(dashboard, "Canceled.").await;
    }

    /// Post-job cleanup: scratch space first, agent queues last.
    async fn cleanup(&self, selected: &[ItemId], job_id: &str) {
        self.processor.cleanup_job(job_id).await;
        if let Err(e) = self.orchestrator.cleanup(selected).await {
            warn!(error = %e, "Agent cleanup failed");
        }
    }
}
