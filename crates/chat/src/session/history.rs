use observer_core::Result;
use observer_transport::HistoryPage;

use super::{ChatSession, TranscriptChange};
use crate::entry::TranscriptEntry;
use crate::pagination::{LoadKind, PageRequest, SkipReason};
use crate::store::MergeMode;

/// Result of a history load that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { received: usize, has_more: bool },
    /// No request was made
    Skipped(SkipReason),
    /// History was cleared while the request was out, so the page was dropped
    Stale,
}

impl ChatSession {
    /// Load the newest page. Runs once per mount; a failed attempt may be retried.
    ///
    /// A failure leaves the transcript empty but usable: sending still works.
    pub async fn load_initial(&self) -> Result<LoadOutcome> {
        self.load(LoadKind::Initial).await
    }

    /// Load the page just older than everything confirmed so far.
    ///
    /// A no-op while another load is in flight, before the initial page, or once the
    /// server reports no more history. A failure leaves pagination untouched.
    pub async fn load_more(&self) -> Result<LoadOutcome> {
        self.load(LoadKind::Older).await
    }

    /// Delete the conversation on the server, then reset the transcript
    pub async fn clear_history(&self) -> Result<()> {
        self.ensure_mounted()?;
        self.until_unmounted(self.transport.clear_history()).await?;

        let mut state = self.lock();
        self.ensure_mounted()?;
        state.generation += 1;
        state.store.clear();
        state.pagination.reset_empty();
        state.sender.abandon();
        self.publish(&mut state, Some(TranscriptChange::Cleared));

        tracing::info!(session_id = %self.session_id, "chat history cleared");
        Ok(())
    }

    async fn load(&self, kind: LoadKind) -> Result<LoadOutcome> {
        let (request, generation) = match self.claim_page(kind)? {
            Ok(claimed) => claimed,
            Err(reason) => {
                tracing::debug!(session_id = %self.session_id, ?kind, ?reason, "history load skipped");
                return Ok(LoadOutcome::Skipped(reason));
            }
        };

        tracing::debug!(
            session_id = %self.session_id,
            ?kind,
            offset = request.offset,
            limit = request.limit,
            "loading history"
        );
        let result = self.until_unmounted(self.transport.fetch_history(request.offset, request.limit)).await;
        self.apply_page(request, generation, result)
    }

    fn claim_page(&self, kind: LoadKind) -> Result<std::result::Result<(PageRequest, u64), SkipReason>> {
        let mut state = self.lock();
        self.ensure_mounted()?;

        let confirmed = state.store.confirmed_count();
        let claimed = match kind {
            LoadKind::Initial => state.pagination.begin_initial(),
            LoadKind::Older => state.pagination.begin_older(confirmed),
        };
        if claimed.is_ok() {
            self.publish(&mut state, None);
        }
        Ok(claimed.map(|request| (request, state.generation)))
    }

    fn apply_page(&self, request: PageRequest, generation: u64, result: Result<HistoryPage>) -> Result<LoadOutcome> {
        let mut state = self.lock();
        self.ensure_mounted()?;
        if state.generation != generation {
            tracing::debug!(session_id = %self.session_id, offset = request.offset, "dropping page from before clear");
            return Ok(LoadOutcome::Stale);
        }

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                state.pagination.fail();
                self.publish(&mut state, None);
                tracing::warn!(
                    session_id = %self.session_id,
                    kind = ?request.kind,
                    offset = request.offset,
                    error = %err,
                    "failed to load chat history"
                );
                return Err(err);
            }
        };

        let entries: Vec<TranscriptEntry> = page.messages.iter().cloned().map(TranscriptEntry::from).collect();
        let (mode, change) = match request.kind {
            LoadKind::Initial => (MergeMode::Append, TranscriptChange::Appended),
            LoadKind::Older => (MergeMode::Prepend, TranscriptChange::OlderPrepended),
        };
        state.store.apply(&entries, mode);

        let confirmed = state.store.confirmed_count();
        state.pagination.complete(request.kind, &page, confirmed);
        self.publish(&mut state, Some(change));

        tracing::debug!(
            session_id = %self.session_id,
            received = entries.len(),
            loaded = confirmed,
            total = page.total,
            has_more = page.has_more,
            "history page merged"
        );
        Ok(LoadOutcome::Loaded { received: entries.len(), has_more: page.has_more })
    }
}
