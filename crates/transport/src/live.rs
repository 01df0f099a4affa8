//! Lease-counted access to the server's live event stream.
//!
//! The dashboard opens a single push connection no matter how many views listen to it.
//! Each view holds a [`Lease`]; the link opens with the first lease and closes when the
//! last one is dropped. How the link speaks to the server is up to the [`LiveConnector`].

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::broadcast;

use crate::retry::RetryConfig;
use observer_core::{Error, Result};

const EVENT_BUFFER: usize = 256;

/// Out-of-band notification pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl LiveEvent {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self { kind: kind.into(), data }
    }
}

/// Opens the underlying push connection
pub trait LiveConnector: Send + Sync {
    /// Start delivering events into `sink` until the returned link is closed
    fn open(&self, sink: broadcast::Sender<LiveEvent>) -> Result<Box<dyn LiveLink>>;
}

/// An open push connection
pub trait LiveLink: Send {
    fn close(self: Box<Self>);
}

struct LinkState {
    leases: usize,
    link: Option<Box<dyn LiveLink>>,
}

/// Shares one live connection between any number of listeners
pub struct ConnectionManager {
    connector: Arc<dyn LiveConnector>,
    events: broadcast::Sender<LiveEvent>,
    state: Mutex<LinkState>,
    retry: RetryConfig,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn LiveConnector>) -> Arc<Self> {
        Self::with_retry(connector, RetryConfig::default())
    }

    pub fn with_retry(connector: Arc<dyn LiveConnector>, retry: RetryConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self { connector, events, state: Mutex::new(LinkState { leases: 0, link: None }), retry })
    }

    /// Take a lease, opening the connection if this is the first one
    pub fn acquire(self: &Arc<Self>) -> Result<Lease> {
        let mut state = self.lock();
        if state.link.is_none() {
            state.link = Some(self.connector.open(self.events.clone())?);
            tracing::info!("live connection opened");
        }
        state.leases += 1;
        tracing::debug!(leases = state.leases, "live lease acquired");

        Ok(Lease { manager: Arc::clone(self), released: false })
    }

    fn release(&self) {
        let mut state = self.lock();
        state.leases = state.leases.saturating_sub(1);
        tracing::debug!(leases = state.leases, "live lease released");

        if state.leases == 0
            && let Some(link) = state.link.take()
        {
            link.close();
            tracing::info!("live connection closed");
        }
    }

    /// Reopen a dropped connection while anyone still holds a lease.
    ///
    /// Returns `Ok(false)` when no lease remains, so there is nothing to reconnect.
    pub async fn reconnect(&self) -> Result<bool> {
        if let Some(stale) = self.lock().link.take() {
            stale.close();
        }

        let mut attempt = 0;
        loop {
            {
                let mut state = self.lock();
                if state.leases == 0 {
                    return Ok(false);
                }
                if state.link.is_some() {
                    return Ok(true);
                }

                match self.connector.open(self.events.clone()) {
                    Ok(link) => {
                        state.link = Some(link);
                        tracing::info!(attempt = attempt + 1, "live connection re-established");
                        return Ok(true);
                    }
                    Err(err) => {
                        attempt += 1;
                        if !self.retry.should_retry(attempt) {
                            tracing::warn!(attempt, error = %err, "giving up on live reconnection");
                            return Err(err);
                        }
                        tracing::warn!(attempt, error = %err, "live reconnection failed");
                    }
                }
            }

            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.events.subscribe()
    }

    pub fn lease_count(&self) -> usize {
        self.lock().leases
    }

    pub fn is_connected(&self) -> bool {
        self.lock().link.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A listener's claim on the live connection; released on drop
pub struct Lease {
    manager: Arc<ConnectionManager>,
    released: bool,
}

impl Lease {
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.manager.subscribe()
    }

    pub fn release(mut self) {
        self.released = true;
        self.manager.release();
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            self.manager.release();
        }
    }
}

static GLOBAL: OnceLock<Arc<ConnectionManager>> = OnceLock::new();

/// Register the process-wide connection manager
pub fn install_global(manager: Arc<ConnectionManager>) -> Result<()> {
    GLOBAL.set(manager).map_err(|_| Error::Other("live connection manager already installed".to_string()))
}

pub fn global() -> Option<Arc<ConnectionManager>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use observer_core::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingConnector {
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        failures_left: AtomicUsize,
    }

    struct CountingLink {
        closed: Arc<AtomicUsize>,
    }

    impl LiveLink for CountingLink {
        fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl LiveConnector for CountingConnector {
        fn open(&self, sink: broadcast::Sender<LiveEvent>) -> Result<Box<dyn LiveLink>> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(TransportError::Network("refused".to_string()).into());
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let _ = sink.send(LiveEvent::new("connected", serde_json::Value::Null));
            Ok(Box::new(CountingLink { closed: Arc::clone(&self.closed) }))
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig { max_attempts: 3, initial_delay_ms: 1, max_delay_ms: 5, backoff_multiplier: 2.0 }
    }

    #[test]
    fn test_single_connection_for_many_leases() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::new(connector.clone());

        let first = manager.acquire().unwrap();
        let second = manager.acquire().unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
        assert_eq!(manager.lease_count(), 2);

        drop(first);
        assert!(manager.is_connected());
        assert_eq!(connector.closed.load(Ordering::SeqCst), 0);

        second.release();
        assert!(!manager.is_connected());
        assert_eq!(manager.lease_count(), 0);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reacquire_opens_again() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::new(connector.clone());

        drop(manager.acquire().unwrap());
        let _lease = manager.acquire().unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_open_takes_no_lease() {
        let connector = Arc::new(CountingConnector { failures_left: AtomicUsize::new(1), ..Default::default() });
        let manager = ConnectionManager::new(connector);

        assert!(manager.acquire().is_err());
        assert_eq!(manager.lease_count(), 0);
        assert!(manager.acquire().is_ok());
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::new(connector);
        let mut events = manager.subscribe();

        let _lease = manager.acquire().unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, "connected");
    }

    #[tokio::test]
    async fn test_reconnect_retries_until_open() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::with_retry(connector.clone(), fast_retry());
        let _lease = manager.acquire().unwrap();

        connector.failures_left.store(2, Ordering::SeqCst);
        assert!(manager.reconnect().await.unwrap());
        assert!(manager.is_connected());
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnect_gives_up() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::with_retry(connector.clone(), fast_retry());
        let _lease = manager.acquire().unwrap();

        connector.failures_left.store(10, Ordering::SeqCst);
        assert!(manager.reconnect().await.is_err());
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_without_leases_is_noop() {
        let connector = Arc::new(CountingConnector::default());
        let manager = ConnectionManager::new(connector.clone());

        assert!(!manager.reconnect().await.unwrap());
        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_live_event_wire_shape() {
        let event: LiveEvent = serde_json::from_str(r#"{"type": "agent_updated", "data": {"id": 3}}"#).unwrap();
        assert_eq!(event.kind, "agent_updated");
        assert_eq!(event.data["id"], 3);
    }

    #[test]
    fn test_install_global_once() {
        let manager = ConnectionManager::new(Arc::new(CountingConnector::default()));
        let first = install_global(Arc::clone(&manager));
        if first.is_ok() {
            assert!(global().is_some());
        }
        assert!(install_global(manager).is_err());
    }
}
