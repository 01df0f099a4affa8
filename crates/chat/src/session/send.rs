use chrono::Utc;
use observer_core::{Error, Result, redact_content};
use observer_transport::SendReply;

use super::{ChatSession, TranscriptChange};
use crate::entry::TranscriptEntry;
use crate::store::MergeMode;

/// How a send ended
#[derive(Debug)]
pub enum SendOutcome {
    /// The assistant answered; the reply is in the transcript
    Replied(TranscriptEntry),
    /// The request failed; `entry` is the apology shown in its place
    Failed { entry: TranscriptEntry, error: Error },
    /// History was cleared while the request was out, so nothing was applied
    Discarded,
}

impl ChatSession {
    /// Send `text` as the user.
    ///
    /// The user's entry is in the transcript before this future first yields. Blank text
    /// and a second send while one is outstanding are rejected with [`Error::Validation`].
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        let (pending, generation) = self.begin_send(text)?;
        let result = self.until_unmounted(self.transport.send_message(pending.content())).await;
        self.finish_send(&pending, generation, result)
    }

    fn begin_send(&self, text: &str) -> Result<(TranscriptEntry, u64)> {
        let mut state = self.lock();
        self.ensure_mounted()?;

        let pending = state.sender.begin(text, Utc::now())?;
        state.store.push_pending(pending.clone());
        self.publish(&mut state, Some(TranscriptChange::Appended));

        tracing::debug!(
            session_id = %self.session_id,
            id = %pending.id(),
            content = %redact_content(pending.content(), &self.privacy),
            "sending message"
        );
        Ok((pending, state.generation))
    }

    fn finish_send(&self, pending: &TranscriptEntry, generation: u64, result: Result<SendReply>) -> Result<SendOutcome> {
        let mut state = self.lock();
        self.ensure_mounted()?;
        if state.generation != generation {
            tracing::debug!(session_id = %self.session_id, id = %pending.id(), "dropping reply from before clear");
            return Ok(SendOutcome::Discarded);
        }

        match result {
            Ok(reply) => {
                let Some(reconciliation) = state.sender.complete(&reply) else {
                    return Ok(SendOutcome::Discarded);
                };

                if let Some((local_id, server_id)) = reconciliation.confirm {
                    tracing::debug!(session_id = %self.session_id, %local_id, %server_id, "pending message confirmed");
                    state.store.confirm_pending(&local_id, server_id);
                }
                state.store.apply(std::slice::from_ref(&reconciliation.reply), MergeMode::Append);

                let confirmed = state.store.confirmed_count();
                state.pagination.note_confirmed(confirmed);
                self.publish(&mut state, Some(TranscriptChange::Appended));

                tracing::debug!(
                    session_id = %self.session_id,
                    id = %reconciliation.reply.id(),
                    content = %redact_content(reconciliation.reply.content(), &self.privacy),
                    "reply received"
                );
                Ok(SendOutcome::Replied(reconciliation.reply))
            }
            Err(error) => {
                tracing::warn!(session_id = %self.session_id, id = %pending.id(), error = %error, "message send failed");

                let Some(entry) = state.sender.fail(&error, Utc::now()) else {
                    return Err(error);
                };
                state.store.apply(std::slice::from_ref(&entry), MergeMode::Append);
                self.publish(&mut state, Some(TranscriptChange::Appended));
                Ok(SendOutcome::Failed { entry, error })
            }
        }
    }
}
