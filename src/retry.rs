//! Exponential backoff retry engine shared by the client façade and the
//! Generate Orchestrator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

use crate::error::LLMError;

/// Callback invoked right before sleeping ahead of a retry attempt.
pub type OnRetry = Arc<dyn Fn(u32, &LLMError) + Send + Sync>;

/// Retry policy: exponential backoff with optional jitter and a caller-visible
/// `on_retry` hook, matching the shape every call site (the client façade and
/// the Generate Orchestrator) configures.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of *retries* after the first attempt. `0` means exactly
    /// one attempt total.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
    pub on_retry: Option<OnRetry>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter_enabled", &self.jitter_enabled)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            on_retry: None,
        }
    }
}

impl RetryConfig {
    /// A config that retries exactly `n` times with no delay, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            backoff_multiplier: 2.0,
            jitter_enabled: false,
            on_retry: None,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64()).max(0.0);
        let mut delay = Duration::from_secs_f64(capped);
        if self.jitter_enabled && delay > Duration::ZERO {
            let jittered_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
            delay = Duration::from_millis(jittered_ms);
        }
        delay
    }
}

/// Runs `f` under the given retry policy. `cancel`, when provided, is a
/// [`Notify`] the caller can signal to abort the wait between attempts; a
/// cancelled wait surfaces as [`LLMError::Abort`].
///
/// Algorithm: call `f`; on success return immediately. On failure, return the
/// error as-is if it isn't retryable or the retry budget is exhausted.
/// Otherwise compute `delay = min(max_delay, base_delay * multiplier^attempt)`,
/// apply jitter if enabled, widen it to the error's own `retry_after` hint
/// when that is larger, invoke `on_retry`, wait (cancellably), and retry.
pub async fn retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: Option<&Notify>,
    mut f: F,
) -> Result<T, LLMError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LLMError>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_retries || !err.is_retryable() {
                    return Err(err);
                }

                let mut delay = config.delay_for_attempt(attempt);
                if let Some(retry_after) = err.retry_after() {
                    if retry_after > delay {
                        delay = retry_after;
                    }
                }

                tracing::warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying after failure");

                if let Some(on_retry) = &config.on_retry {
                    on_retry(attempt + 1, &err);
                }

                if delay > Duration::ZERO {
                    match cancel {
                        Some(notify) => {
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = notify.notified() => {
                                    return Err(LLMError::Abort {
                                        message: "retry cancelled while waiting to back off".into(),
                                    });
                                }
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                }

                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::immediate(3);
        let result = retry(&config, None, || {
            let count = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(LLMError::Server {
                        message: "flaky".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::immediate(1);
        let result: Result<(), LLMError> = retry(&config, None, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(LLMError::Server {
                    message: "still down".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::immediate(5);
        let result: Result<(), LLMError> = retry(&config, None, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(LLMError::Authentication {
                    message: "bad key".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_max_retries_means_exactly_one_attempt() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::immediate(0);
        let result: Result<(), LLMError> = retry(&config, None, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(LLMError::Server {
                    message: "down".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
