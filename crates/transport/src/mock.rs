use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

use crate::Transport;
use crate::types::*;
use observer_core::{Error, Result, TransportError};

/// Scripted answer to the next `send_message`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MockReply {
    Text { content: String },
    Error { message: String },
}

/// Mock configuration from TOML file
#[derive(Debug, Default, Deserialize)]
struct MockScript {
    #[serde(default)]
    history: Vec<HistoryMessage>,
    #[serde(default)]
    replies: Vec<MockReply>,
    #[serde(default)]
    echo_user_ids: bool,
    #[serde(default)]
    fresh_reply_ids: bool,
}

/// A request the mock received, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Send { text: String },
    History { offset: usize, limit: usize },
    Clear,
}

/// Holds requests open until released, so tests can observe in-flight state
#[derive(Debug, Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
}

impl Gate {
    fn new() -> Self {
        Self { permits: Arc::new(Semaphore::new(0)) }
    }

    /// Let `n` waiting (or future) requests through
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    async fn pass(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Default)]
struct MockState {
    /// Server-side history, oldest first
    history: Vec<HistoryMessage>,
    replies: VecDeque<MockReply>,
    history_failures: VecDeque<TransportError>,
    requests: Vec<MockRequest>,
    next_id: usize,
    clock: Option<DateTime<Utc>>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    /// Strictly increasing timestamps, never behind the wall clock or anything already stored
    fn tick(&mut self) -> DateTime<Utc> {
        let last = self.history.last().map(|m| m.timestamp);
        let base = self.clock.into_iter().chain(last).fold(Utc::now(), |a, b| a.max(b));
        let next = base + Duration::milliseconds(100);
        self.clock = Some(next);
        next
    }
}

/// In-memory stand-in for the Observer server
///
/// Behaves like the real endpoint: each successful send stores the user message and the
/// reply, so later history pages shift accordingly.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    echo_user_ids: bool,
    fresh_reply_ids: bool,
    send_gate: Option<Gate>,
    history_gate: Option<Gate>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the server with `history` (sorted by timestamp on insert)
    pub fn with_history(history: Vec<HistoryMessage>) -> Self {
        let mock = Self::new();
        mock.set_history(history);
        mock
    }

    /// Seed `count` alternating user/assistant messages, `h1` being the oldest
    pub fn with_seeded_history(count: usize) -> Self {
        Self::with_history(seed_history(count))
    }

    /// Load a scripted mock from TOML
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let script: MockScript =
            toml::from_str(toml_str).map_err(|e| Error::Parse(format!("failed to parse mock script: {}", e)))?;

        let mut mock = Self::with_history(script.history);
        mock.echo_user_ids = script.echo_user_ids;
        mock.fresh_reply_ids = script.fresh_reply_ids;
        mock.lock().replies = script.replies.into();
        Ok(mock)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Report the stored user message's ID in every reply
    pub fn echo_user_ids(mut self) -> Self {
        self.echo_user_ids = true;
        self
    }

    /// Answer sends the way the Observer server does: the reply carries a fresh ID that history
    /// never returns, stamped with the user message's time
    pub fn fresh_reply_ids(mut self) -> Self {
        self.fresh_reply_ids = true;
        self
    }

    /// Hold every send until the returned gate releases it
    pub fn gate_sends(&mut self) -> Gate {
        let gate = Gate::new();
        self.send_gate = Some(gate.clone());
        gate
    }

    /// Hold every history fetch until the returned gate releases it
    pub fn gate_history(&mut self) -> Gate {
        let gate = Gate::new();
        self.history_gate = Some(gate.clone());
        gate
    }

    pub fn set_history(&self, mut history: Vec<HistoryMessage>) {
        history.sort_by_key(|m| m.timestamp);
        self.lock().history = history;
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.lock().replies.push_back(reply);
    }

    /// Make the next history fetch fail with `error`
    pub fn fail_next_history(&self, error: TransportError) {
        self.lock().history_failures.push_back(error);
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.lock().requests.clone()
    }

    /// Offsets of every history request so far
    pub fn history_offsets(&self) -> Vec<usize> {
        self.lock()
            .requests
            .iter()
            .filter_map(|r| match r {
                MockRequest::History { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect()
    }

    pub fn server_total(&self) -> usize {
        self.lock().history.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send_message(&self, text: &str) -> Result<SendReply> {
        self.lock().requests.push(MockRequest::Send { text: text.to_string() });

        if let Some(gate) = &self.send_gate {
            gate.pass().await;
        }

        let mut state = self.lock();
        let reply = state.replies.pop_front().unwrap_or_else(|| MockReply::Text { content: format!("echo: {}", text) });

        match reply {
            MockReply::Error { message } => Err(TransportError::status(500, message).into()),
            MockReply::Text { content } => {
                let user_id = state.next_id("u");
                let user_time = state.tick();
                state.history.push(HistoryMessage::new(&user_id, Role::User, text, user_time));

                let reply_id = state.next_id("a");
                let reply_time = state.tick();
                state.history.push(HistoryMessage::new(&reply_id, Role::Assistant, &content, reply_time));

                let reply = if self.fresh_reply_ids {
                    SendReply::new(state.next_id("r"), content, user_time)
                } else {
                    SendReply::new(reply_id, content, reply_time)
                };
                Ok(if self.echo_user_ids { reply.with_user_message_id(user_id) } else { reply })
            }
        }
    }

    async fn fetch_history(&self, offset: usize, limit: usize) -> Result<HistoryPage> {
        self.lock().requests.push(MockRequest::History { offset, limit });

        if let Some(gate) = &self.history_gate {
            gate.pass().await;
        }

        let mut state = self.lock();
        if let Some(error) = state.history_failures.pop_front() {
            return Err(error.into());
        }

        let total = state.history.len();
        let end = total.saturating_sub(offset);
        let start = end.saturating_sub(limit);
        let messages = state.history[start..end].to_vec();
        Ok(HistoryPage::new(messages, total, offset, limit))
    }

    async fn clear_history(&self) -> Result<()> {
        let mut state = self.lock();
        state.requests.push(MockRequest::Clear);
        state.history.clear();
        Ok(())
    }
}

/// `count` alternating user/assistant messages one second apart, `h1` being the oldest
pub fn seed_history(count: usize) -> Vec<HistoryMessage> {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).single().unwrap_or_else(Utc::now);
    (1..=count)
        .map(|n| {
            let role = if n % 2 == 1 { Role::User } else { Role::Assistant };
            HistoryMessage::new(format!("h{}", n), role, format!("message {}", n), base + Duration::seconds(n as i64))
        })
        .collect()
}
