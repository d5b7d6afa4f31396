//! Retry with exponential backoff for transient store failures.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{validation, RetryConfig};
use crate::error::{MigrateError, Result};

/// Retries operations whose errors look transient.
///
/// Holds only the read-only [`RetryConfig`], so one instance can be shared by
/// every worker without coordination.
#[derive(Debug, Clone)]
pub struct ConnectionRecovery {
    config: RetryConfig,
    patterns: Vec<String>,
}

impl ConnectionRecovery {
    /// Build a recovery wrapper, rejecting invalid retry settings.
    pub fn new(config: RetryConfig) -> Result<Self> {
        validation::validate_retry(&config)?;
        let patterns = config
            .retryable_errors
            .iter()
            .map(|p| p.to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `err` should be retried.
    ///
    /// Data errors (type mismatch, unsupported type, missing key) never are.
    /// Everything else is matched case-insensitively against the configured
    /// substrings, using [`MigrateError::classification_text`] so that key
    /// names never take part.
    pub fn is_retryable(&self, err: &MigrateError) -> bool {
        if err.is_fatal_for_key() {
            return false;
        }
        let message = err.classification_text().to_lowercase();
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based) failed.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.config.backoff_factor.powi(exponent);
        let max = self.config.max_delay();
        let delay_nanos = self.config.initial_delay().as_nanos() as f64 * factor;
        if !delay_nanos.is_finite() || delay_nanos >= max.as_nanos() as f64 {
            return max;
        }
        Duration::from_nanos(delay_nanos as u64)
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// The first call is attempt 1; `operation` is invoked at most
    /// `max_attempts` times. A non-retryable error is returned immediately.
    pub async fn with_retry<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation_name, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= max_attempts || !self.is_retryable(&e) {
                        return Err(e);
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation_name, attempt, max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn recovery(max_attempts: u32) -> ConnectionRecovery {
        ConnectionRecovery::new(RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            backoff_factor: 2.0,
            retryable_errors: vec!["Connection Reset".into(), "timed out".into()],
        })
        .unwrap()
    }

    #[test]
    fn test_backoff_sequence() {
        let r = recovery(10);
        assert_eq!(r.backoff_delay(1), Duration::from_millis(1));
        assert_eq!(r.backoff_delay(2), Duration::from_millis(2));
        assert_eq!(r.backoff_delay(3), Duration::from_millis(4));
        assert_eq!(r.backoff_delay(4), Duration::from_millis(8));
        assert_eq!(r.backoff_delay(5), Duration::from_millis(10));
        assert_eq!(r.backoff_delay(500), Duration::from_millis(10));
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let r = recovery(3);
        assert!(r.is_retryable(&MigrateError::Connection("CONNECTION RESET by peer".into())));
        assert!(r.is_retryable(&MigrateError::timeout("GET k", Duration::from_secs(1))));
        assert!(!r.is_retryable(&MigrateError::Connection("auth failed".into())));
    }

    #[test]
    fn test_data_errors_never_retryable() {
        let r = recovery(3);
        let err = MigrateError::TypeMismatch {
            key: "connection reset".into(),
            expected: "hash".into(),
            actual: "list".into(),
        };
        assert!(!r.is_retryable(&err));
    }

    #[test]
    fn test_key_name_is_not_classified() {
        let r = recovery(3);
        let denied = MigrateError::key_operation(
            "session:timed out:1",
            "write to target",
            MigrateError::Connection("NOAUTH authentication required".into()),
        );
        assert!(!r.is_retryable(&denied));

        let reset = MigrateError::key_operation(
            "user:1",
            "write to target",
            MigrateError::Connection("connection reset by peer".into()),
        );
        assert!(r.is_retryable(&reset));
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let r = recovery(3);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = r
            .with_retry("flaky", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(MigrateError::Connection("connection reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let r = recovery(4);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = r
            .with_retry("always down", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(MigrateError::Connection("connection reset".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_single_invocation() {
        let r = recovery(5);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = r
            .with_retry("bad auth", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(MigrateError::Connection("NOAUTH authentication required".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_config() {
        let r = recovery(1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let _: Result<()> = r
            .with_retry("once", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(MigrateError::Connection("connection reset".into()))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
