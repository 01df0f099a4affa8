use chrono::{DateTime, Utc};
use observer_core::{Error, Result};
use observer_transport::SendReply;

use crate::entry::{EntryId, FailureKind, TranscriptEntry};

/// What to do with the transcript once a reply arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Pending entry to re-key, when the server reported the ID it stored the message under
    pub confirm: Option<(EntryId, EntryId)>,
    /// The assistant's reply, ready to append
    pub reply: TranscriptEntry,
}

#[derive(Debug, Clone)]
struct InFlight {
    local_id: EntryId,
    created_at: DateTime<Utc>,
}

/// Tracks the single outstanding send and turns its outcome into transcript entries
#[derive(Debug, Clone)]
pub struct OptimisticSendController {
    in_flight: Option<InFlight>,
    failure_message: String,
}

impl OptimisticSendController {
    pub fn new(failure_message: impl Into<String>) -> Self {
        Self { in_flight: None, failure_message: failure_message.into() }
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&EntryId> {
        self.in_flight.as_ref().map(|sending| &sending.local_id)
    }

    /// Validate `text` and build the pending user entry to show right away
    pub fn begin(&mut self, text: &str, now: DateTime<Utc>) -> Result<TranscriptEntry> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("message is empty".to_string()));
        }
        if self.is_sending() {
            return Err(Error::Validation("a message is already awaiting a reply".to_string()));
        }

        let entry = TranscriptEntry::pending_user(text, now);
        self.in_flight = Some(InFlight { local_id: entry.id().clone(), created_at: now });
        Ok(entry)
    }

    /// Finish the outstanding send with the server's reply
    pub fn complete(&mut self, reply: &SendReply) -> Option<Reconciliation> {
        let sending = self.in_flight.take()?;
        let confirm = reply.user_message_id.as_ref().map(|id| (sending.local_id, EntryId::new(id.as_str())));

        Some(Reconciliation { confirm, reply: TranscriptEntry::from_reply(reply, sending.created_at) })
    }

    /// Finish the outstanding send with a synthesized assistant entry describing the failure.
    ///
    /// The user's pending entry stays in place.
    pub fn fail(&mut self, error: &Error, now: DateTime<Utc>) -> Option<TranscriptEntry> {
        let sending = self.in_flight.take()?;
        let at = now.max(sending.created_at);
        Some(TranscriptEntry::send_failure(self.failure_message.as_str(), FailureKind::from_error(error), at))
    }

    /// Forget the outstanding send without producing any entry
    pub fn abandon(&mut self) {
        self.in_flight = None;
    }
}
