//! The chat controller behind one mounted chat view.
//!
//! A [`ChatSession`] owns the transcript, pagination and the outstanding send. Every
//! mutation replaces the published [`TranscriptSnapshot`]; views watch it through
//! [`ChatSession::subscribe`]. The state lock is only taken in synchronous sections,
//! never across a transport call.

use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::entry::TranscriptEntry;
use crate::pagination::{LoadPhase, PaginationController, PaginationState};
use crate::send::OptimisticSendController;
use crate::store::MessageStore;
use observer_core::{ChatConfig, Config, Error, PrivacyConfig, Result};
use observer_transport::{HttpTransport, Transport};

mod history;
mod send;

pub use history::LoadOutcome;
pub use send::SendOutcome;

/// What the latest snapshot changed, so the view knows how to scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptChange {
    /// Entries added at the newest end (initial page, sends, replies)
    Appended,
    /// An older page merged in above the current entries
    OlderPrepended,
    Cleared,
}

/// How many times each kind of change has been published
///
/// Watchers only see the latest snapshot, so they diff these against the last counts they saw
/// to learn about changes in snapshots they skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub appended: u64,
    pub older_prepended: u64,
    pub cleared: u64,
}

impl ChangeCounts {
    fn record(&mut self, change: TranscriptChange) {
        match change {
            TranscriptChange::Appended => self.appended += 1,
            TranscriptChange::OlderPrepended => self.older_prepended += 1,
            TranscriptChange::Cleared => self.cleared += 1,
        }
    }

    /// Kinds of change published after `earlier`, clears first and appends last
    pub fn since(&self, earlier: &ChangeCounts) -> Vec<TranscriptChange> {
        [
            (self.cleared, earlier.cleared, TranscriptChange::Cleared),
            (self.older_prepended, earlier.older_prepended, TranscriptChange::OlderPrepended),
            (self.appended, earlier.appended, TranscriptChange::Appended),
        ]
        .into_iter()
        .filter(|(now, before, _)| now > before)
        .map(|(_, _, change)| change)
        .collect()
    }
}

/// Immutable view of the session at one revision
#[derive(Debug, Clone)]
pub struct TranscriptSnapshot {
    pub revision: u64,
    pub entries: Arc<Vec<TranscriptEntry>>,
    pub pagination: PaginationState,
    pub phase: LoadPhase,
    pub sending: bool,
    /// The change this revision made
    pub change: Option<TranscriptChange>,
    pub changes: ChangeCounts,
}

impl TranscriptSnapshot {
    fn empty() -> Self {
        Self {
            revision: 0,
            entries: Arc::new(Vec::new()),
            pagination: PaginationState::default(),
            phase: LoadPhase::Idle,
            sending: false,
            change: None,
            changes: ChangeCounts::default(),
        }
    }
}

struct SessionState {
    store: MessageStore,
    pagination: PaginationController,
    sender: OptimisticSendController,
    revision: u64,
    changes: ChangeCounts,
    /// Bumped when history is cleared; responses issued before that are dropped
    generation: u64,
}

impl SessionState {
    fn snapshot(&self, change: Option<TranscriptChange>) -> TranscriptSnapshot {
        TranscriptSnapshot {
            revision: self.revision,
            entries: self.store.snapshot(),
            pagination: self.pagination.state(),
            phase: self.pagination.phase(),
            sending: self.sender.is_sending(),
            change,
            changes: self.changes,
        }
    }
}

/// Synchronizes one chat view with the server
pub struct ChatSession {
    session_id: String,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
    updates: watch::Sender<TranscriptSnapshot>,
    unmounted: CancellationToken,
    privacy: PrivacyConfig,
}

impl ChatSession {
    /// Mount a session with an empty transcript
    pub fn new(transport: Arc<dyn Transport>, config: &ChatConfig) -> Self {
        let state = SessionState {
            store: MessageStore::new(),
            pagination: PaginationController::new(config.page_size),
            sender: OptimisticSendController::new(config.failure_message.as_str()),
            revision: 0,
            changes: ChangeCounts::default(),
            generation: 0,
        };
        let (updates, _) = watch::channel(TranscriptSnapshot::empty());

        tracing::debug!(session_id = %config.session_id, page_size = config.page_size, "chat session mounted");
        Self {
            session_id: config.session_id.clone(),
            transport,
            state: Mutex::new(state),
            updates,
            unmounted: CancellationToken::new(),
            privacy: PrivacyConfig::default(),
        }
    }

    /// Mount with the chat and privacy settings from `config`
    pub fn from_config(transport: Arc<dyn Transport>, config: &Config) -> Self {
        let privacy = PrivacyConfig {
            log_message_content: config.logging.privacy.log_message_content,
            truncate_length: config.logging.privacy.truncate_length,
        };
        Self::new(transport, &config.chat).with_privacy(privacy)
    }

    /// Mount against the HTTP server described by `config`
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::from_config(Arc::new(transport), config))
    }

    pub fn with_privacy(mut self, privacy: PrivacyConfig) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.updates.borrow().clone()
    }

    pub fn entries(&self) -> Arc<Vec<TranscriptEntry>> {
        self.lock().store.snapshot()
    }

    pub fn pagination(&self) -> PaginationState {
        self.lock().pagination.state()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().pagination.is_loading()
    }

    pub fn is_sending(&self) -> bool {
        self.lock().sender.is_sending()
    }

    /// Watch every published snapshot; the receiver starts at the current one
    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.updates.subscribe()
    }

    /// Tear the view down. In-flight requests are abandoned and their results discarded.
    pub fn unmount(&self) {
        if self.unmounted.is_cancelled() {
            return;
        }
        self.unmounted.cancel();

        let mut state = self.lock();
        state.pagination.fail();
        state.sender.abandon();
        tracing::debug!(session_id = %self.session_id, "chat session unmounted");
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted.is_cancelled()
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.unmounted.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }

    /// Race `operation` against unmount
    async fn until_unmounted<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.unmounted.cancelled() => Err(Error::Cancelled),
            result = operation => result,
        }
    }

    fn publish(&self, state: &mut SessionState, change: Option<TranscriptChange>) {
        state.revision += 1;
        if let Some(change) = change {
            state.changes.record(change);
        }
        self.updates.send_replace(state.snapshot(change));
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.unmounted.cancel();
    }
}
