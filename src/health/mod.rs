//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! checker.rs probe loop (own task, fan-out per round)
//!     → state.rs snapshots (per instance, aggregated per service)
//!     → change callbacks → LoadBalancer::set_healthy
//! ```
//!
//! # Design Decisions
//! - Callbacks fire synchronously with the transition so the next
//!   select() observes the change promptly
//! - Notifications are best-effort with no replay; late subscribers read
//!   state via the get_* accessors
//! - Stop is an idempotent cancellation token

pub mod checker;
pub mod state;

pub use checker::{HealthCallback, HealthChecker};
pub use state::{HealthStatus, InstanceHealth, ServiceHealth};
