//! Ordered, ID-unique transcript storage.
//!
//! Every insertion funnels through [`merge`], which is pure: it never mutates its inputs and
//! merging the same batch twice yields the same transcript as merging it once.

use chrono::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::entry::{EntryId, TranscriptEntry};

/// How much earlier than a local entry its history copy may be stamped (client and server clocks differ)
const CLOCK_SKEW_SECS: i64 = 120;

/// Where an incoming batch sits relative to the existing entries before sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Older history loaded above what is already shown
    Prepend,
    /// Initial history, sends and replies
    Append,
}

/// Combine `existing` with `incoming`, dropping duplicates and ordering by creation time.
///
/// An incoming entry replaces an existing one with the same ID; the first occurrence wins
/// within `incoming`. A history entry the transcript has not seen also replaces a provisional
/// entry with the same role and content. Entries with equal timestamps keep their relative placement.
pub fn merge(existing: &[TranscriptEntry], incoming: &[TranscriptEntry], mode: MergeMode) -> Vec<TranscriptEntry> {
    let mut batch_ids: HashSet<&EntryId> = HashSet::with_capacity(incoming.len());
    let batch: Vec<&TranscriptEntry> = incoming.iter().filter(|entry| batch_ids.insert(entry.id())).collect();
    let replaced = superseded(existing, &batch);
    let kept = existing.iter().filter(|entry| !batch_ids.contains(entry.id()) && !replaced.contains(entry.id()));

    let mut merged: Vec<TranscriptEntry> = match mode {
        MergeMode::Prepend => batch.into_iter().chain(kept).cloned().collect(),
        MergeMode::Append => kept.chain(batch).cloned().collect(),
    };

    let mut seen = HashSet::with_capacity(merged.len());
    merged.retain(|entry| seen.insert(entry.id().clone()));
    merged.sort_by_key(|entry| entry.created_at());
    merged
}

/// Provisional entries in `existing` that a history entry in `batch` stands for.
///
/// Each unseen history entry claims the oldest unclaimed provisional entry with the same role and
/// content, provided it is not stamped more than [`CLOCK_SKEW_SECS`] before it.
fn superseded(existing: &[TranscriptEntry], batch: &[&TranscriptEntry]) -> HashSet<EntryId> {
    let mut claimed = HashSet::new();
    if !existing.iter().any(TranscriptEntry::is_provisional) {
        return claimed;
    }

    let known: HashSet<&EntryId> = existing.iter().map(TranscriptEntry::id).collect();
    let skew = Duration::seconds(CLOCK_SKEW_SECS);
    let history = batch
        .iter()
        .filter(|entry| entry.counts_toward_history() && !entry.is_provisional() && !known.contains(entry.id()));

    for server in history {
        let local = existing.iter().find(|local| {
            local.is_provisional()
                && !claimed.contains(local.id())
                && local.role() == server.role()
                && local.content() == server.content()
                && server.created_at() >= local.created_at() - skew
        });
        if let Some(local) = local {
            tracing::debug!(local = %local.id(), server = %server.id(), "history copy replaces provisional entry");
            claimed.insert(local.id().clone());
        }
    }
    claimed
}

/// The transcript as currently materialized on this client
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    entries: Arc<Vec<TranscriptEntry>>,
    index: HashMap<EntryId, usize>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Shared handle to the current entries, cheap to hand to observers
    pub fn snapshot(&self) -> Arc<Vec<TranscriptEntry>> {
        Arc::clone(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntryId) -> Option<&TranscriptEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.index.contains_key(id)
    }

    /// Merge a batch into the transcript
    pub fn apply(&mut self, incoming: &[TranscriptEntry], mode: MergeMode) {
        let merged = merge(&self.entries, incoming, mode);
        self.replace(merged);
    }

    pub fn push_pending(&mut self, entry: TranscriptEntry) {
        self.apply(std::slice::from_ref(&entry), MergeMode::Append);
    }

    /// Swap a pending entry for its confirmed form under `server_id`.
    ///
    /// If `server_id` is already present (history got there first) the pending copy is dropped.
    /// Returns false when `local_id` is not in the transcript.
    pub fn confirm_pending(&mut self, local_id: &EntryId, server_id: EntryId) -> bool {
        if !self.contains(local_id) {
            return false;
        }

        let server_copy_present = self.contains(&server_id);
        let entries = self
            .entries
            .iter()
            .filter_map(|entry| {
                if entry.id() != local_id {
                    Some(entry.clone())
                } else if server_copy_present {
                    None
                } else {
                    Some(entry.confirmed_as(server_id.clone()))
                }
            })
            .collect();
        self.replace(entries);
        true
    }

    pub fn remove(&mut self, id: &EntryId) -> Option<TranscriptEntry> {
        let removed = self.get(id).cloned()?;
        let entries = self.entries.iter().filter(|entry| entry.id() != id).cloned().collect();
        self.replace(entries);
        Some(removed)
    }

    /// Number of entries that also exist in the server's history
    pub fn confirmed_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.counts_toward_history()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_pending()).count()
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    fn replace(&mut self, mut entries: Vec<TranscriptEntry>) {
        let mut index = HashMap::with_capacity(entries.len());
        let mut position = 0;
        entries.retain(|entry| {
            if index.contains_key(entry.id()) {
                tracing::warn!(id = %entry.id(), "dropping duplicate transcript entry");
                return false;
            }
            index.insert(entry.id().clone(), position);
            position += 1;
            true
        });

        self.entries = Arc::new(entries);
        self.index = index;
    }
}
