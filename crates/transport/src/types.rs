use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The author of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored message as returned by the history endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl HistoryMessage {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { id: id.into(), role, content: content.into(), timestamp }
    }
}

/// One page of history
///
/// `offset` counts back from the newest message, so offset 0 is the most recent page.
/// `messages` are always sorted oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<HistoryMessage>,
    pub total: usize,
    pub has_more: bool,
}

impl HistoryPage {
    /// Build a page, deriving `has_more` from the request window
    pub fn new(messages: Vec<HistoryMessage>, total: usize, offset: usize, limit: usize) -> Self {
        Self { messages, total, has_more: offset.saturating_add(limit) < total }
    }

    pub fn empty() -> Self {
        Self { messages: Vec::new(), total: 0, has_more: false }
    }
}

/// The assistant's answer to a sent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReply {
    pub id: String,
    #[serde(rename = "response", alias = "content")]
    pub content: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Server ID of the stored user message, for servers that echo it back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<String>,
}

impl SendReply {
    pub fn new(id: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { id: id.into(), content: content.into(), timestamp, user_message_id: None }
    }

    pub fn with_user_message_id(mut self, id: impl Into<String>) -> Self {
        self.user_message_id = Some(id.into());
        self
    }
}

/// Body of `POST /api/v1/chat`
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SendRequest<'a> {
    pub message: &'a str,
    pub context: SendContext<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SendContext<'a> {
    pub session_id: &'a str,
}

/// ISO-8601 timestamps; values without an offset are read as UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Some(parsed.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::from_str::<Role>("\"assistant\"").unwrap(), Role::Assistant);
        assert!(serde_json::from_str::<Role>("\"system\"").is_err());
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_timestamp_parse_rfc3339() {
        let parsed = timestamp::parse("2025-03-01T10:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_timestamp_parse_naive_as_utc() {
        let parsed = timestamp::parse("2025-03-01T10:00:00.250000").unwrap();
        assert_eq!(parsed.timestamp_millis(), Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap().timestamp_millis() + 250);

        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_history_page_deserialization() {
        let json = r#"{
            "messages": [
                {"id": "a", "role": "user", "content": "hi", "timestamp": "2025-03-01T10:00:00"},
                {"id": "b", "role": "assistant", "content": "hello", "timestamp": "2025-03-01T10:00:00.100000"}
            ],
            "total": 12,
            "has_more": true
        }"#;

        let page: HistoryPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.messages[1].role, Role::Assistant);
        assert_eq!(page.total, 12);
        assert!(page.has_more);
    }

    #[test]
    fn test_history_page_has_more() {
        assert!(HistoryPage::new(vec![], 45, 0, 20).has_more);
        assert!(HistoryPage::new(vec![], 45, 20, 20).has_more);
        assert!(!HistoryPage::new(vec![], 45, 40, 20).has_more);
        assert!(!HistoryPage::new(vec![], 40, 20, 20).has_more);
        assert!(!HistoryPage::empty().has_more);
    }

    #[test]
    fn test_send_reply_accepts_server_shape() {
        let json = r#"{"id": "r1", "message": "hi", "response": "hi there", "timestamp": "2025-03-01T10:00:00"}"#;
        let reply: SendReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.id, "r1");
        assert_eq!(reply.content, "hi there");
        assert!(reply.user_message_id.is_none());
    }

    #[test]
    fn test_send_reply_with_echoed_user_id() {
        let json = r#"{"id": "r1", "content": "ok", "timestamp": "2025-03-01T10:00:00Z", "user_message_id": "u9"}"#;
        let reply: SendReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.content, "ok");
        assert_eq!(reply.user_message_id.as_deref(), Some("u9"));
    }

    #[test]
    fn test_send_request_shape() {
        let request = SendRequest { message: "hello", context: SendContext { session_id: "desk" } };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"message": "hello", "context": {"session_id": "desk"}}));
    }
}
