use observer_transport::HistoryPage;
use serde::Serialize;

/// Pagination bookkeeping published alongside the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PaginationState {
    /// Server-confirmed entries currently materialized
    pub loaded_count: usize,
    /// Whether older history remains on the server
    pub has_more: bool,
    /// Last known size of the server-side conversation
    pub total_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    Initial,
    Older,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading(LoadKind),
}

/// Why a load request was not issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The initial page already arrived for this mount
    AlreadyLoaded,
    /// No initial page yet, so there is nothing to page back from
    NotLoaded,
    /// The server reported no older history
    Exhausted,
    /// Another history request is still outstanding
    InFlight,
}

/// A history request the session should issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub kind: LoadKind,
    pub offset: usize,
    pub limit: usize,
}

/// Decides when history may be requested and from which offset
#[derive(Debug, Clone)]
pub struct PaginationController {
    page_size: usize,
    state: PaginationState,
    phase: LoadPhase,
    initial_loaded: bool,
}

impl PaginationController {
    pub fn new(page_size: usize) -> Self {
        Self { page_size: page_size.max(1), state: PaginationState::default(), phase: LoadPhase::Idle, initial_loaded: false }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, LoadPhase::Loading(_))
    }

    pub fn initial_loaded(&self) -> bool {
        self.initial_loaded
    }

    /// Claim the initial page request. Failed initial loads may be retried.
    pub fn begin_initial(&mut self) -> Result<PageRequest, SkipReason> {
        if self.initial_loaded {
            return Err(SkipReason::AlreadyLoaded);
        }
        if self.is_loading() {
            return Err(SkipReason::InFlight);
        }

        self.phase = LoadPhase::Loading(LoadKind::Initial);
        Ok(PageRequest { kind: LoadKind::Initial, offset: 0, limit: self.page_size })
    }

    /// Claim the next older page, starting after the `confirmed_count` entries already held
    pub fn begin_older(&mut self, confirmed_count: usize) -> Result<PageRequest, SkipReason> {
        if !self.initial_loaded {
            return Err(SkipReason::NotLoaded);
        }
        if self.is_loading() {
            return Err(SkipReason::InFlight);
        }
        if !self.state.has_more {
            return Err(SkipReason::Exhausted);
        }

        self.phase = LoadPhase::Loading(LoadKind::Older);
        Ok(PageRequest { kind: LoadKind::Older, offset: confirmed_count, limit: self.page_size })
    }

    /// Record a successful page once its entries have been merged
    pub fn complete(&mut self, kind: LoadKind, page: &HistoryPage, confirmed_count: usize) {
        self.phase = LoadPhase::Idle;
        if kind == LoadKind::Initial {
            self.initial_loaded = true;
        }

        self.state.has_more = page.has_more;
        self.state.total_count = page.total.max(confirmed_count);
        self.state.loaded_count = confirmed_count;
    }

    /// Return to idle after a failed request, leaving counts untouched
    pub fn fail(&mut self) {
        self.phase = LoadPhase::Idle;
    }

    /// Account for confirmed entries added outside of paging, such as a reply
    pub fn note_confirmed(&mut self, confirmed_count: usize) {
        let added = confirmed_count.saturating_sub(self.state.loaded_count);
        self.state.loaded_count = confirmed_count;
        self.state.total_count = (self.state.total_count + added).max(confirmed_count);
    }

    /// The server-side conversation is now known to be empty
    pub fn reset_empty(&mut self) {
        self.phase = LoadPhase::Idle;
        self.initial_loaded = true;
        self.state = PaginationState::default();
    }
}
