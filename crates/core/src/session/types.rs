use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::agent::{DiscoveredItem, ItemId};
use crate::delivery::MessageRef;
use crate::orchestrator::ScanMode;

/// Where a session currently is in the job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingScanChoice,
    Discovering,
    AwaitingSelection,
    QueuedForDownload,
    Downloading,
    PostProcessing,
    Delivering,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingScanChoice => "awaiting_scan_choice",
            Self::Discovering => "discovering",
            Self::AwaitingSelection => "awaiting_selection",
            Self::QueuedForDownload => "queued_for_download",
            Self::Downloading => "downloading",
            Self::PostProcessing => "post_processing",
            Self::Delivering => "delivering",
        };
        f.write_str(name)
    }
}

/// One discovered item with its selection toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub id: ItemId,
    pub name: String,
    pub size_bytes: u64,
    pub selected: bool,
}

/// One submitted link being worked through the lifecycle.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub chat_id: i64,
    pub link: String,
    pub mode: ScanMode,
    pub candidates: Vec<CandidateItem>,
    /// Item ids confirmed for download.
    pub confirmed: Vec<ItemId>,
    /// The shared progress message, once created.
    pub dashboard: Option<MessageRef>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Job {
    pub fn new(chat_id: i64, link: String, mode: ScanMode) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            link,
            mode,
            candidates: Vec::new(),
            confirmed: Vec::new(),
            dashboard: None,
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn cancel_handle(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    pub fn signal_cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub fn selected_ids(&self) -> Vec<ItemId> {
        self.candidates
            .iter()
            .filter(|c| c.selected)
            .map(|c| c.id)
            .collect()
    }

    pub fn unselected_ids(&self) -> Vec<ItemId> {
        self.candidates
            .iter()
            .filter(|c| !c.selected)
            .map(|c| c.id)
            .collect()
    }
}

/// Guard violations on session transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a job is already in progress")]
    JobActive,

    #[error("no job is awaiting this action (phase: {phase})")]
    WrongPhase { phase: SessionPhase },

    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("nothing is selected")]
    EmptySelection,
}

/// Per-user conversation state. Transitions are pure and synchronous;
/// all I/O around them belongs to the driver.
#[derive(Debug)]
pub struct Session {
    pub user_id: i64,
    pub chat_id: i64,
    phase: SessionPhase,
    pending_link: Option<String>,
    job: Option<Job>,
    last_activity: Instant,
}

impl Session {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self {
            user_id,
            chat_id,
            phase: SessionPhase::Idle,
            pending_link: None,
            job: None,
            last_activity: Instant::now(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn job_mut(&mut self) -> Option<&mut Job> {
        self.job.as_mut()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Keep the reply target current; a user can reach the bot from a
    /// different chat than the one the session was created in.
    pub fn set_chat(&mut self, chat_id: i64) {
        self.chat_id = chat_id;
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// A session is evictable only when nothing is in flight.
    pub fn is_evictable(&self, idle_timeout: Duration) -> bool {
        self.phase == SessionPhase::Idle && self.idle_for() >= idle_timeout
    }

    /// Accept a new link. Only one job runs per user at a time.
    pub fn submit_link(&mut self, link: String) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Idle {
            return Err(SessionError::JobActive);
        }
        self.pending_link = Some(link);
        self.phase = SessionPhase::AwaitingScanChoice;
        self.touch();
        Ok(())
    }

    /// Commit the scan mode and open the job.
    pub fn choose_mode(&mut self, mode: ScanMode) -> Result<(), SessionError> {
        if self.phase != SessionPhase::AwaitingScanChoice {
            return Err(SessionError::WrongPhase { phase: self.phase });
        }
        let link = self.pending_link.take().unwrap_or_default();
        self.job = Some(Job::new(self.chat_id, link, mode));
        self.phase = SessionPhase::Discovering;
        self.touch();
        Ok(())
    }

    /// Record discovery results. Everything starts selected.
    pub fn discovered(&mut self, items: Vec<DiscoveredItem>) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Discovering {
            return Err(SessionError::WrongPhase { phase: self.phase });
        }
        let job = self.job.as_mut().ok_or(SessionError::WrongPhase {
            phase: SessionPhase::Idle,
        })?;
        job.candidates = items
            .into_iter()
            .map(|i| CandidateItem {
                id: i.id,
                name: i.name,
                size_bytes: i.size_bytes,
                selected: true,
            })
            .collect();
        self.phase = SessionPhase::AwaitingSelection;
        self.touch();
        Ok(())
    }

    /// Replace the candidate list with a re-polled one, keeping the
    /// toggles of items that are still present.
    pub fn refresh_candidates(&mut self, items: Vec<DiscoveredItem>) -> Result<(), SessionError> {
        if self.phase != SessionPhase::AwaitingSelection {
            return Err(SessionError::WrongPhase { phase: self.phase });
        }
        let job = self.job.as_mut().ok_or(SessionError::WrongPhase {
            phase: SessionPhase::Idle,
        })?;
        let previous: std::collections::HashMap<ItemId, bool> = job
            .candidates
            .iter()
            .map(|c| (c.id, c.selected))
            .collect();
        job.candidates = items
            .into_iter()
            .map(|i| CandidateItem {
                selected: previous.get(&i.id).copied().unwrap_or(true),
                id: i.id,
                name: i.name,
                size_bytes: i.size_bytes,
            })
            .collect();
        self.touch();
        Ok(())
    }

    pub fn toggle_item(&mut self, item_id: ItemId) -> Result<(), SessionError> {
        if self.phase != SessionPhase::AwaitingSelection {
            return Err(SessionError::WrongPhase { phase: self.phase });
        }
        let job = self.job.as_mut().ok_or(SessionError::UnknownItem(item_id))?;
        let candidate = job
            .candidates
            .iter_mut()
            .find(|c| c.id == item_id)
            .ok_or(SessionError::UnknownItem(item_id))?;
        candidate.selected = !candidate.selected;
        self.touch();
        Ok(())
    }

    pub fn set_all(&mut self, selected: bool) -> Result<(), SessionError> {
        if self.phase != SessionPhase::AwaitingSelection {
            return Err(SessionError::WrongPhase { phase: self.phase });
        }
        if let Some(job) = self.job.as_mut() {
            for c in &mut job.candidates {
                c.selected = selected;
            }
        }
        self.touch();
        Ok(())
    }

    /// Lock in the selection. Returns (selected, unselected) item ids.
    pub fn confirm(&mut self) -> Result<(Vec<ItemId>, Vec<ItemId>), SessionError> {
        if self.phase != SessionPhase::AwaitingSelection {
            return Err(SessionError::WrongPhase { phase: self.phase });
        }
        let job = self.job.as_mut().ok_or(SessionError::WrongPhase {
            phase: SessionPhase::Idle,
        })?;
        let selected = job.selected_ids();
        if selected.is_empty() {
            return Err(SessionError::EmptySelection);
        }
        let unselected = job.unselected_ids();
        job.confirmed = selected.clone();
        self.phase = SessionPhase::QueuedForDownload;
        self.touch();
        Ok((selected, unselected))
    }

    pub fn advance(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.touch();
    }

    /// Signal cancel on the active job, if any. The driver finishes the
    /// teardown; the session stays in its phase until `finish` is called.
    pub fn request_cancel(&mut self) -> bool {
        self.touch();
        match &self.job {
            Some(job) => {
                job.signal_cancel();
                true
            }
            None => {
                // A pending link with no job yet is simply dropped.
                let had_pending = self.pending_link.take().is_some();
                if had_pending {
                    self.phase = SessionPhase::Idle;
                }
                had_pending
            }
        }
    }

    /// Close out the job, successful or not, and return to Idle.
    pub fn finish(&mut self) -> Option<Job> {
        self.phase = SessionPhase::Idle;
        self.pending_link = None;
        self.touch();
        self.job.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: ItemId, name: &str) -> DiscoveredItem {
        DiscoveredItem {
            id,
            name: name.to_string(),
            size_bytes: 100,
            availability: "ONLINE".to_string(),
        }
    }

    fn session_with_candidates() -> Session {
        let mut s = Session::new(1, 10);
        s.submit_link("https://example.test/x".into()).unwrap();
        s.choose_mode(ScanMode::Regular).unwrap();
        s.discovered(vec![item(1, "a"), item(2, "b"), item(3, "c")])
            .unwrap();
        s
    }

    #[test]
    fn happy_path_phases() {
        let mut s = Session::new(1, 10);
        assert_eq!(s.phase(), SessionPhase::Idle);

        s.submit_link("https://example.test/x".into()).unwrap();
        assert_eq!(s.phase(), SessionPhase::AwaitingScanChoice);

        s.choose_mode(ScanMode::Deep).unwrap();
        assert_eq!(s.phase(), SessionPhase::Discovering);

        s.discovered(vec![item(1, "a")]).unwrap();
        assert_eq!(s.phase(), SessionPhase::AwaitingSelection);

        let (selected, unselected) = s.confirm().unwrap();
        assert_eq!(selected, vec![1]);
        assert!(unselected.is_empty());
        assert_eq!(s.phase(), SessionPhase::QueuedForDownload);

        s.finish();
        assert_eq!(s.phase(), SessionPhase::Idle);
        assert!(s.job().is_none());
    }

    #[test]
    fn second_link_is_rejected_while_job_active() {
        let mut s = session_with_candidates();
        assert_eq!(
            s.submit_link("https://example.test/y".into()),
            Err(SessionError::JobActive)
        );
    }

    #[test]
    fn discovered_items_start_selected() {
        let s = session_with_candidates();
        assert!(s.job().unwrap().candidates.iter().all(|c| c.selected));
    }

    #[test]
    fn toggle_flips_one_item() {
        let mut s = session_with_candidates();
        s.toggle_item(2).unwrap();
        assert_eq!(s.job().unwrap().selected_ids(), vec![1, 3]);
        s.toggle_item(2).unwrap();
        assert_eq!(s.job().unwrap().selected_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn toggle_unknown_item_is_an_error() {
        let mut s = session_with_candidates();
        assert_eq!(s.toggle_item(99), Err(SessionError::UnknownItem(99)));
    }

    #[test]
    fn confirm_requires_a_selection() {
        let mut s = session_with_candidates();
        s.set_all(false).unwrap();
        assert_eq!(s.confirm(), Err(SessionError::EmptySelection));
        // Still selectable, not failed.
        assert_eq!(s.phase(), SessionPhase::AwaitingSelection);
    }

    #[test]
    fn select_all_and_deselect_all() {
        let mut s = session_with_candidates();
        s.set_all(false).unwrap();
        assert!(s.job().unwrap().selected_ids().is_empty());
        s.set_all(true).unwrap();
        assert_eq!(s.job().unwrap().selected_ids().len(), 3);
    }

    #[test]
    fn refresh_preserves_existing_toggles() {
        let mut s = session_with_candidates();
        s.toggle_item(2).unwrap();
        s.refresh_candidates(vec![item(2, "b"), item(3, "c"), item(4, "d")])
            .unwrap();
        let job = s.job().unwrap();
        // Item 2 kept its off toggle, new item 4 starts selected.
        assert_eq!(job.selected_ids(), vec![3, 4]);
    }

    #[test]
    fn cancel_of_pending_link_returns_to_idle() {
        let mut s = Session::new(1, 10);
        s.submit_link("https://example.test/x".into()).unwrap();
        assert!(s.request_cancel());
        assert_eq!(s.phase(), SessionPhase::Idle);
    }

    #[test]
    fn cancel_signals_the_job() {
        let mut s = session_with_candidates();
        let cancel = s.job().unwrap().cancel_handle();
        assert!(!*cancel.borrow());
        s.request_cancel();
        assert!(*cancel.borrow());
    }

    #[test]
    fn wrong_phase_transitions_are_rejected() {
        let mut s = Session::new(1, 10);
        assert!(matches!(
            s.choose_mode(ScanMode::Regular),
            Err(SessionError::WrongPhase { .. })
        ));
        assert!(matches!(
            s.confirm(),
            Err(SessionError::WrongPhase { .. })
        ));
    }

    #[test]
    fn eviction_requires_idle_phase() {
        let s = session_with_candidates();
        assert!(!s.is_evictable(Duration::ZERO));
        let idle = Session::new(2, 20);
        assert!(idle.is_evictable(Duration::ZERO));
    }
}
