//! Scroll anchoring for the chat viewport.
//!
//! Changes are recorded as intents when the transcript changes and applied in
//! [`ScrollAnchorController::after_layout`], once the new entries have been laid out.

use crate::pagination::{LoadKind, LoadPhase};
use crate::session::{ChangeCounts, TranscriptChange, TranscriptSnapshot};

/// The scrollable area showing the transcript
pub trait Viewport {
    /// Height of everything rendered, visible or not
    fn content_height(&self) -> f32;

    /// Height of the visible area
    fn client_height(&self) -> f32;

    fn scroll_top(&self) -> f32;

    fn set_scroll_top(&mut self, top: f32);

    fn scroll_to_bottom(&mut self) {
        let bottom = (self.content_height() - self.client_height()).max(0.0);
        self.set_scroll_top(bottom);
    }
}

/// A scroll adjustment waiting for the next layout pass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScrollIntent {
    #[default]
    None,
    Bottom,
    /// Keep the same content in view after older entries grow the top by the height difference
    PreserveAnchor { previous_height: f32 },
}

/// Keeps the viewport pinned to new messages, except while older history is loading
#[derive(Debug, Clone, Default)]
pub struct ScrollAnchorController {
    loading_older: bool,
    pending: ScrollIntent,
    last_revision: Option<u64>,
    seen: ChangeCounts,
}

impl ScrollAnchorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> ScrollIntent {
        self.pending
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older
    }

    pub fn begin_load_older(&mut self) {
        self.loading_older = true;
    }

    /// Older load finished without prepending anything
    pub fn end_load_older(&mut self) {
        self.loading_older = false;
    }

    pub fn on_entries_appended(&mut self) {
        if self.loading_older {
            tracing::trace!("auto-scroll suppressed while loading older history");
            return;
        }
        if self.pending == ScrollIntent::None {
            self.pending = ScrollIntent::Bottom;
        }
    }

    /// Older entries were merged but not yet rendered; `viewport` still shows the old content
    pub fn on_older_entries_prepended(&mut self, viewport: &impl Viewport) {
        self.loading_older = true;
        self.pending = ScrollIntent::PreserveAnchor { previous_height: viewport.content_height() };
    }

    pub fn on_cleared(&mut self) {
        self.loading_older = false;
        self.pending = ScrollIntent::Bottom;
    }

    /// Feed a published snapshot, before the viewport renders it.
    ///
    /// Snapshots may be skipped; every change published since the last observed one is applied.
    pub fn observe(&mut self, snapshot: &TranscriptSnapshot, viewport: &impl Viewport) {
        if self.last_revision == Some(snapshot.revision) {
            return;
        }
        self.last_revision = Some(snapshot.revision);
        let changes = snapshot.changes.since(&self.seen);
        self.seen = snapshot.changes;

        let loading_older = snapshot.phase == LoadPhase::Loading(LoadKind::Older);
        if loading_older {
            self.begin_load_older();
        }

        for change in changes {
            match change {
                TranscriptChange::Appended => self.on_entries_appended(),
                TranscriptChange::OlderPrepended => self.on_older_entries_prepended(viewport),
                TranscriptChange::Cleared => self.on_cleared(),
            }
        }

        if !loading_older && !matches!(self.pending, ScrollIntent::PreserveAnchor { .. }) {
            self.end_load_older();
        }
    }

    /// Apply the pending intent now that layout reflects the latest transcript
    pub fn after_layout(&mut self, viewport: &mut impl Viewport) -> ScrollIntent {
        let intent = std::mem::take(&mut self.pending);
        match intent {
            ScrollIntent::None => {}
            ScrollIntent::Bottom => viewport.scroll_to_bottom(),
            ScrollIntent::PreserveAnchor { previous_height } => {
                let grown = viewport.content_height() - previous_height;
                viewport.set_scroll_top(viewport.scroll_top() + grown);
                self.loading_older = false;
            }
        }
        intent
    }
}
