//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admit or fail fast per service)
//!     → retry.rs (retry retryable outcomes with backoff + jitter)
//!     → breaker records the FINAL outcome, not individual attempts
//! ```
//!
//! # Design Decisions
//! - One breaker per service, owned by a lazy registry
//! - Retries never count toward breaker failures; only the settled
//!   result after the retry loop does
//! - All breaker entry points serialize on one mutex per breaker

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{BreakerState, BreakerStats, CircuitBreaker};
pub use registry::BreakerRegistry;
pub use retry::{RetryError, RetryResult, Retryer};
