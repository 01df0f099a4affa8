use chrono::{DateTime, Utc};
use observer_core::{Error, TransportError};
use observer_transport::{HistoryMessage, Role, SendReply};
use serde::{Deserialize, Serialize};

const LOCAL_PREFIX: &str = "local-";
const FAILURE_PREFIX: &str = "failure-";

/// Identifier of a transcript entry, unique within one transcript
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh client-side ID for a provisional entry
    pub fn local() -> Self {
        Self(format!("{}{}", LOCAL_PREFIX, uuid::Uuid::new_v4()))
    }

    fn failure() -> Self {
        Self(format!("{}{}", FAILURE_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where an entry's current form came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Created on this client, not yet acknowledged by the server
    LocalPending,
    /// Authoritative copy from the server
    ServerConfirmed,
}

/// Why a synthesized failure entry exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Network,
    Timeout,
    Server,
    Decode,
    Other,
}

impl FailureKind {
    pub fn from_error(error: &Error) -> Self {
        match error.as_transport() {
            Some(TransportError::Network(_)) => FailureKind::Network,
            Some(TransportError::Timeout(_)) => FailureKind::Timeout,
            Some(TransportError::Status { .. }) => FailureKind::Server,
            Some(TransportError::Decode(_)) => FailureKind::Decode,
            None => FailureKind::Other,
        }
    }
}

/// One user or assistant message in the chat view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    id: EntryId,
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
    origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureKind>,
    /// ID came from a send response and may differ from the one history stores it under
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    from_send: bool,
}

impl TranscriptEntry {
    /// A server-confirmed entry
    pub fn confirmed(id: impl Into<EntryId>, role: Role, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            created_at,
            origin: Origin::ServerConfirmed,
            failure: None,
            from_send: false,
        }
    }

    /// The user's message as shown before the server answers
    pub fn pending_user(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::local(),
            role: Role::User,
            content: content.into(),
            created_at,
            origin: Origin::LocalPending,
            failure: None,
            from_send: false,
        }
    }

    /// The assistant's reply, never ordered before the message it answers
    pub fn from_reply(reply: &SendReply, not_before: DateTime<Utc>) -> Self {
        let created_at = reply.timestamp.max(not_before);
        let entry = Self::confirmed(reply.id.as_str(), Role::Assistant, reply.content.as_str(), created_at);
        Self { from_send: true, ..entry }
    }

    /// Assistant entry standing in for a reply that never came
    pub fn send_failure(message: impl Into<String>, kind: FailureKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::failure(),
            role: Role::Assistant,
            content: message.into(),
            created_at,
            origin: Origin::ServerConfirmed,
            failure: Some(kind),
            from_send: false,
        }
    }

    /// This entry under its server-assigned ID
    pub fn confirmed_as(&self, id: EntryId) -> Self {
        Self { id, origin: Origin::ServerConfirmed, ..self.clone() }
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn is_pending(&self) -> bool {
        self.origin == Origin::LocalPending
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Shown under an ID history may not know; a history copy with the same role and content supersedes it
    pub fn is_provisional(&self) -> bool {
        self.is_pending() || self.from_send
    }

    /// Whether this entry occupies a slot in the server's history
    ///
    /// Failure entries are confirmed for display purposes only and never exist on the server.
    pub fn counts_toward_history(&self) -> bool {
        self.origin == Origin::ServerConfirmed && self.failure.is_none()
    }
}

impl From<HistoryMessage> for TranscriptEntry {
    fn from(message: HistoryMessage) -> Self {
        Self::confirmed(message.id, message.role, message.content, message.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    #[test]
    fn test_local_ids_are_distinct() {
        let a = EntryId::local();
        let b = EntryId::local();
        assert_ne!(a, b);
        assert!(a.is_local());
        assert!(!EntryId::new("42").is_local());
    }

    #[test]
    fn test_pending_user_entry() {
        let entry = TranscriptEntry::pending_user("hello", at(0));
        assert!(entry.is_pending());
        assert!(entry.id().is_local());
        assert_eq!(entry.role(), Role::User);
        assert_eq!(entry.content(), "hello");
        assert!(!entry.counts_toward_history());
    }

    #[test]
    fn test_from_history_message() {
        let entry = TranscriptEntry::from(HistoryMessage::new("m1", Role::Assistant, "hi", at(5)));
        assert_eq!(entry.id().as_str(), "m1");
        assert_eq!(entry.origin(), Origin::ServerConfirmed);
        assert_eq!(entry.created_at(), at(5));
        assert!(entry.counts_toward_history());
        assert!(!entry.is_provisional());
    }

    #[test]
    fn test_reply_is_not_ordered_before_question() {
        let reply = SendReply::new("a1", "hi there", at(1));

        let skewed = TranscriptEntry::from_reply(&reply, at(10));
        assert_eq!(skewed.created_at(), at(10));

        let normal = TranscriptEntry::from_reply(&reply, at(0));
        assert_eq!(normal.created_at(), at(1));
        assert_eq!(normal.role(), Role::Assistant);
        assert!(normal.is_provisional());
        assert!(normal.counts_toward_history());
    }

    #[test]
    fn test_send_failure_entry() {
        let entry = TranscriptEntry::send_failure("Sorry", FailureKind::Network, at(3));
        assert!(entry.is_failure());
        assert_eq!(entry.origin(), Origin::ServerConfirmed);
        assert!(!entry.counts_toward_history());
        assert!(!entry.id().is_local());
    }

    #[test]
    fn test_confirmed_as_keeps_content() {
        let pending = TranscriptEntry::pending_user("hello", at(0));
        let confirmed = pending.confirmed_as(EntryId::new("u7"));
        assert_eq!(confirmed.id().as_str(), "u7");
        assert_eq!(confirmed.content(), "hello");
        assert_eq!(confirmed.created_at(), at(0));
        assert!(!confirmed.is_pending());
    }

    #[test]
    fn test_failure_kind_from_error() {
        assert_eq!(FailureKind::from_error(&TransportError::Timeout(5).into()), FailureKind::Timeout);
        assert_eq!(FailureKind::from_error(&TransportError::status(502, "").into()), FailureKind::Server);
        assert_eq!(FailureKind::from_error(&TransportError::Network("x".into()).into()), FailureKind::Network);
        assert_eq!(FailureKind::from_error(&Error::Other("x".into())), FailureKind::Other);
    }

    #[test]
    fn test_origin_serialization() {
        assert_eq!(serde_json::to_string(&Origin::LocalPending).unwrap(), "\"local-pending\"");
        assert_eq!(serde_json::to_string(&Origin::ServerConfirmed).unwrap(), "\"server-confirmed\"");
    }
}
