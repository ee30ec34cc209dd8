//! Per-service circuit breaker.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: a bounded number of probes decide recovery
//!
//! # State Transitions
//! ```text
//! closed    → open:      consecutive failures >= max_failures
//! open      → half-open: reset_timeout elapsed and a request arrives
//! half-open → closed:    consecutive successes >= success_threshold
//! half-open → open:      any failure
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::CircuitBreakerConfig;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker, serialized for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: String,
    pub failures: u32,
    pub consecutive_successes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
}

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    half_open_requests: u32,
    consecutive_successes: u32,
}

/// A three-state failure gate for one service.
///
/// All entry points lock the single internal mutex, so transitions are
/// serialized per breaker. The admission observed by `allow_request` and a
/// later `record_*` call are not transactional across the two calls; the
/// breaker is a statistical guard, not a correctness invariant.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, mut config: CircuitBreakerConfig) -> Self {
        if config.max_failures == 0 {
            config.max_failures = 5;
        }
        if config.reset_timeout_secs == 0 {
            config.reset_timeout_secs = 30;
        }
        if config.half_open_max_requests == 0 {
            config.half_open_max_requests = 3;
        }
        if config.success_threshold == 0 {
            config.success_threshold = 2;
        }

        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
                last_failure_at: None,
                half_open_requests: 0,
                consecutive_successes: 0,
            }),
        }
    }

    /// Whether a request may proceed. May transition open → half-open.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.reset_timeout())
                    .unwrap_or(true);
                if elapsed {
                    to_half_open(&mut inner);
                    // The request that triggers the transition is admitted
                    // without counting against half_open_max_requests, so
                    // the half-open phase admits max + 1 probes in total.
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_requests >= self.config.half_open_max_requests {
                    false
                } else {
                    inner.half_open_requests += 1;
                    true
                }
            }
        }
    }

    /// Record a successful final outcome.
    pub fn record_success(&self) {
        self.after_request(true);
    }

    /// Record a failed final outcome (5xx or exhausted transport error).
    pub fn record_failure(&self) {
        self.after_request(false);
    }

    fn after_request(&self, success: bool) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");

        match inner.state {
            BreakerState::Closed => {
                if success {
                    inner.failures = 0;
                } else {
                    inner.failures += 1;
                    inner.last_failure = Some(Instant::now());
                    inner.last_failure_at = Some(Utc::now());
                    if inner.failures >= self.config.max_failures {
                        to_open(&mut inner);
                        tracing::warn!(
                            service = %self.name,
                            failures = inner.failures,
                            "Circuit breaker opened"
                        );
                    }
                }
            }
            BreakerState::HalfOpen => {
                if success {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        to_closed(&mut inner);
                        tracing::info!(service = %self.name, "Circuit breaker closed");
                    }
                } else {
                    to_open(&mut inner);
                    tracing::warn!(service = %self.name, "Circuit breaker reopened from half-open");
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    /// Snapshot for the admin surface.
    pub fn snapshot(&self) -> BreakerStats {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        BreakerStats {
            name: self.name.clone(),
            state: inner.state.as_str().to_string(),
            failures: inner.failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure: inner.last_failure_at,
        }
    }

    /// Force the breaker back to closed with cleared counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        to_closed(&mut inner);
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn to_open(inner: &mut BreakerInner) {
    inner.state = BreakerState::Open;
    inner.last_failure = Some(Instant::now());
    inner.last_failure_at = Some(Utc::now());
    inner.consecutive_successes = 0;
}

fn to_closed(inner: &mut BreakerInner) {
    inner.state = BreakerState::Closed;
    inner.failures = 0;
    inner.consecutive_successes = 0;
    inner.half_open_requests = 0;
}

fn to_half_open(inner: &mut BreakerInner) {
    inner.state = BreakerState::HalfOpen;
    inner.half_open_requests = 0;
    inner.consecutive_successes = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: 3,
            reset_timeout_secs: 1,
            half_open_max_requests: 2,
            success_threshold: 2,
        }
    }

    #[test]
    fn zero_config_falls_back_to_defaults() {
        let cb = CircuitBreaker::new(
            "svc",
            CircuitBreakerConfig {
                max_failures: 0,
                reset_timeout_secs: 0,
                half_open_max_requests: 0,
                success_threshold: 0,
            },
        );
        assert_eq!(cb.config.max_failures, 5);
        assert_eq!(cb.config.reset_timeout_secs, 30);
        assert_eq!(cb.config.half_open_max_requests, 3);
        assert_eq!(cb.config.success_threshold, 2);
    }

    #[test]
    fn stays_closed_below_failure_threshold() {
        let cb = CircuitBreaker::new("svc", fast_config());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new("svc", fast_config());
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn opens_at_failure_threshold() {
        let cb = CircuitBreaker::new("svc", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn transitions_to_half_open_after_reset_timeout() {
        let cb = CircuitBreaker::new("svc", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(!cb.allow_request());

        std::thread::sleep(Duration::from_millis(1100));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_admits_max_plus_one_probes() {
        let cb = CircuitBreaker::new("svc", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(1100));

        // The transition request plus half_open_max_requests follow-ups.
        assert!(cb.allow_request());
        assert!(cb.allow_request());
        assert!(cb.allow_request());
        assert!(!cb.allow_request());
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let cb = CircuitBreaker::new("svc", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(1100));
        assert!(cb.allow_request());

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);

        let stats = cb.snapshot();
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.consecutive_successes, 0);
    }

    #[test]
    fn half_open_reopens_on_any_failure() {
        let cb = CircuitBreaker::new("svc", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(1100));
        assert!(cb.allow_request());

        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn reset_forces_closed_from_any_state() {
        let cb = CircuitBreaker::new("svc", fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);
        cb.reset();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn snapshot_reflects_failures() {
        let cb = CircuitBreaker::new("svc", fast_config());
        cb.record_failure();
        let stats = cb.snapshot();
        assert_eq!(stats.name, "svc");
        assert_eq!(stats.state, "closed");
        assert_eq!(stats.failures, 1);
        assert!(stats.last_failure.is_some());
    }
}
