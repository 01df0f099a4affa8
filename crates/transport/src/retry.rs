use observer_core::{Error, Result, TransportConfig};
use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 1000, max_delay_ms: 10_000, backoff_multiplier: 2.0 }
    }
}

impl RetryConfig {
    /// Create from the `[transport]` section
    pub fn from_transport(config: &TransportConfig) -> Self {
        Self {
            max_attempts: config.retry_count.max(1),
            initial_delay_ms: config.retry_delay_ms,
            max_delay_ms: config.retry_delay_ms.saturating_mul(10),
            backoff_multiplier: 2.0,
        }
    }

    /// A single attempt, no waiting
    pub fn none() -> Self {
        Self { max_attempts: 1, initial_delay_ms: 0, max_delay_ms: 0, backoff_multiplier: 1.0 }
    }

    /// Calculate delay for the given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
            delay.min(self.max_delay_ms as f64) as u64
        };

        Duration::from_millis(delay_ms)
    }

    /// Check if we should retry given the attempt number
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Check if an error is retryable
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Transport(err) => err.is_retryable(),
        Error::Io(_) => true,
        _ => false,
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only use this for idempotent requests.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !is_retryable_error(&err) || !config.should_retry(attempt) {
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use observer_core::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 1000);
    }

    #[test]
    fn test_retry_config_from_transport() {
        let transport = TransportConfig { retry_count: 5, retry_delay_ms: 200, ..Default::default() };
        let config = RetryConfig::from_transport(&transport);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay_ms, 200);
        assert_eq!(config.max_delay_ms, 2000);
    }

    #[test]
    fn test_retry_delay_calculation() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0).as_millis(), 0);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 2000);
    }

    #[test]
    fn test_retry_delay_with_max() {
        let config =
            RetryConfig { initial_delay_ms: 1000, backoff_multiplier: 10.0, max_delay_ms: 5000, ..Default::default() };

        assert_eq!(config.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 5000);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 5000);
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig { max_attempts: 3, ..Default::default() };

        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
        assert!(!RetryConfig::none().should_retry(1));
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&Error::Transport(TransportError::Timeout(100))));
        assert!(is_retryable_error(&Error::Transport(TransportError::status(503, ""))));
        assert!(!is_retryable_error(&Error::Transport(TransportError::status(404, ""))));
        assert!(!is_retryable_error(&Error::Validation("empty".to_string())));
        assert!(!is_retryable_error(&Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig { max_attempts: 3, initial_delay_ms: 10, max_delay_ms: 100, backoff_multiplier: 2.0 };

        let result = with_retry(&config, "fetch_history", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Transport(TransportError::Network("reset".to_string())))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig { max_attempts: 3, initial_delay_ms: 10, max_delay_ms: 100, backoff_multiplier: 2.0 };

        let result: Result<()> = with_retry(&config, "fetch_history", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transport(TransportError::status(500, "boom")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_permanent_failure() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(&RetryConfig::default(), "clear_history", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transport(TransportError::status(400, "bad request")))
        })
        .await;

        assert!(matches!(result, Err(Error::Transport(TransportError::Status { code: 400, .. }))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
