//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! SIGINT/SIGTERM → wait_for_signal → Shutdown broadcast
//!     → server drains connections
//!     → health checker and retry loops observe cancellation
//! ```

pub mod shutdown;

pub use shutdown::{wait_for_signal, Shutdown};
