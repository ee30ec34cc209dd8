//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → api_key.rs (validate X-API-Key / Bearer, attach identity)
//!     → rate_limit.rs (token bucket keyed by API key id or client IP)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Both stores share one multiplexed Redis connection
//! - Raw API keys are never persisted; lookups go through SHA-256
//! - Rate limit state lives in Redis so replicas share budgets

pub mod api_key;
pub mod rate_limit;

pub use api_key::{ApiKey, ApiKeyManager, CreateKeyRequest, CreateKeyResponse};
pub use rate_limit::{RateLimitDecision, RateLimiter};
