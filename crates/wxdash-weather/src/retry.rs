//! Bounded retry with deterministic exponential backoff.
//!
//! Retried:
//! - Timeouts and connection failures
//! - 5xx server errors, 408 Request Timeout
//! - 429 Too Many Requests (honoring `Retry-After` when given)
//!
//! Not retried:
//! - Other 4xx client errors
//! - Malformed requests
//! - Structural or range validation failures

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Default retry configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Factor applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64, backoff_multiplier: f64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            backoff_multiplier,
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Delay after the `retry`-th failed attempt (0-based):
    /// `base_delay * multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let delay_ms = self.base_delay.as_millis() as f64 * factor;
        let capped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient failure, try again
    Retry,
    /// Permanent failure
    NoRetry,
}

/// Implemented by errors the retry loop can classify.
pub trait Retryable {
    fn retry_decision(&self) -> RetryDecision;

    /// Server-provided minimum wait (e.g. `Retry-After` on a 429).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Classify an HTTP status code
pub fn is_retryable_status(status: u16) -> RetryDecision {
    match status {
        500..=599 => {
            tracing::debug!("Server error ({}), will retry", status);
            RetryDecision::Retry
        }
        429 => {
            tracing::debug!("Rate limited (429), will retry");
            RetryDecision::Retry
        }
        408 => {
            tracing::debug!("Request timeout (408), will retry");
            RetryDecision::Retry
        }
        400..=499 => {
            tracing::debug!("Client error ({}), not retryable", status);
            RetryDecision::NoRetry
        }
        _ => RetryDecision::NoRetry,
    }
}

/// A successful result and the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum RetryError<E> {
    #[error("failed after {attempts} attempt(s): {error}")]
    Fatal { attempts: u32, error: E },

    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Fatal { error, .. } => error,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// States of one `execute` call. `Succeeded` and `Failed` are terminal.
enum State<T, E> {
    Attempting,
    Waiting(Duration),
    Succeeded(T),
    Failed(RetryError<E>),
}

/// Drives an operation through bounded retries.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt
    /// budget is spent.
    ///
    /// # Errors
    /// `RetryError::Fatal` on the first non-retryable failure,
    /// `RetryError::Exhausted` with the last error once `max_attempts`
    /// attempts have failed.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut state = State::Attempting;

        loop {
            state = match state {
                State::Attempting => {
                    attempts += 1;
                    match operation().await {
                        Ok(value) => State::Succeeded(value),
                        Err(error) if error.retry_decision() == RetryDecision::NoRetry => {
                            tracing::debug!("Non-retryable error: {}", error);
                            State::Failed(RetryError::Fatal { attempts, error })
                        }
                        Err(last) if attempts >= max_attempts => {
                            tracing::error!("All {} attempts exhausted: {}", attempts, last);
                            State::Failed(RetryError::Exhausted { attempts, last })
                        }
                        Err(error) => {
                            let scheduled = self.config.delay_for_retry(attempts - 1);
                            // Server hints raise the delay but never past max_delay
                            let delay = error.retry_after().map_or(scheduled, |hint| {
                                scheduled.max(hint.min(self.config.max_delay))
                            });
                            tracing::warn!(
                                "Retryable error on attempt {} of {}: {}",
                                attempts,
                                max_attempts,
                                error
                            );
                            State::Waiting(delay)
                        }
                    }
                }
                State::Waiting(delay) => {
                    tracing::info!(
                        "Retry attempt {} of {}, waiting {:?}",
                        attempts + 1,
                        max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    State::Attempting
                }
                State::Succeeded(value) => {
                    if attempts > 1 {
                        tracing::info!("Request succeeded after {} attempts", attempts);
                    }
                    return Ok(Retried { value, attempts });
                }
                State::Failed(error) => return Err(error),
            };
        }
    }
}
