//! Retry engine with exponential backoff and jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;

/// Error surfaced by a retried attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError {
    /// The request context was cancelled; never retried.
    #[error("request cancelled")]
    Cancelled,

    /// Transport-level failure with the underlying error message.
    #[error("{0}")]
    Transport(String),

    /// Retry budget exhausted without a terminal outcome.
    #[error("max retries exceeded")]
    Exhausted,
}

/// Outcome of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryResult {
    /// Total calls made (1 = no retries).
    pub attempts: u32,
    /// Whether any retry was attempted.
    pub retried: bool,
    /// Final HTTP status code.
    pub status_code: u16,
    /// Last error, if the operation did not end cleanly.
    pub last_error: Option<RetryError>,
}

/// Executes an operation with bounded exponential backoff.
pub struct Retryer {
    config: RetryConfig,
    retryable_status_codes: Vec<u16>,
}

impl Retryer {
    /// Build a retryer, replacing zero or out-of-range values with
    /// defaults.
    pub fn new(mut config: RetryConfig) -> Self {
        let defaults = RetryConfig::default();
        if config.initial_delay_ms == 0 {
            config.initial_delay_ms = defaults.initial_delay_ms;
        }
        if config.max_delay_ms == 0 {
            config.max_delay_ms = defaults.max_delay_ms;
        }
        if config.multiplier <= 0.0 {
            config.multiplier = defaults.multiplier;
        }
        if !(0.0..=1.0).contains(&config.jitter_factor) {
            config.jitter_factor = defaults.jitter_factor;
        }

        Self {
            config,
            retryable_status_codes: vec![502, 503, 504],
        }
    }

    /// Whether a status code triggers a retry.
    pub fn should_retry(&self, status_code: u16) -> bool {
        self.retryable_status_codes.contains(&status_code)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Backoff before retry `attempt` (0-based): exponential growth capped
    /// at `max_delay_ms`, then perturbed by ±`jitter_factor`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay_ms = self.config.initial_delay_ms as f64
            * self.config.multiplier.powi(attempt as i32);
        delay_ms = delay_ms.min(self.config.max_delay_ms as f64);

        if self.config.jitter_factor > 0.0 {
            let jitter =
                delay_ms * self.config.jitter_factor * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
            delay_ms += jitter;
        }

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Run `f` until it returns a terminal outcome or the retry budget is
    /// spent. `f` receives the 0-based attempt index and returns the HTTP
    /// status of the attempt plus an optional transport error.
    ///
    /// Terminal outcomes: a non-retryable status with no error, or a
    /// non-transient error. Cancellation is checked before every attempt
    /// and raced against every backoff sleep.
    pub async fn execute<F, Fut>(&self, cancel: &CancellationToken, mut f: F) -> RetryResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = (u16, Option<RetryError>)>,
    {
        let mut result = RetryResult {
            attempts: 0,
            retried: false,
            status_code: 0,
            last_error: None,
        };

        for attempt in 0..=self.config.max_retries {
            result.attempts = attempt + 1;

            if cancel.is_cancelled() {
                result.last_error = Some(RetryError::Cancelled);
                return result;
            }

            if attempt > 0 {
                result.retried = true;
                let delay = self.delay(attempt - 1);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        result.last_error = Some(RetryError::Cancelled);
                        return result;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let (status_code, error) = f(attempt).await;
            result.status_code = status_code;
            result.last_error = error;

            match &result.last_error {
                None => {
                    if !self.should_retry(status_code) {
                        return result;
                    }
                }
                Some(err) => {
                    if !is_transient(err) {
                        return result;
                    }
                }
            }
        }

        if result.last_error.is_none() {
            result.last_error = Some(RetryError::Exhausted);
        }
        result
    }
}

const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "no such host",
    "i/o timeout",
    "temporary failure",
    "network is unreachable",
    "connection timed out",
    "eof",
];

/// Whether an error is likely transient and worth retrying. Cancellation
/// is never transient; transport errors are matched against a substring
/// table because the underlying error chain is opaque at this layer.
pub fn is_transient(err: &RetryError) -> bool {
    match err {
        RetryError::Cancelled | RetryError::Exhausted => false,
        RetryError::Transport(msg) => {
            let msg = msg.to_ascii_lowercase();
            TRANSIENT_PATTERNS.iter().any(|p| msg.contains(p))
        }
    }
}
