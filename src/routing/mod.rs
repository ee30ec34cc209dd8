//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! request path
//!     → router.rs (longest matching path prefix)
//!     → service index → proxy pipeline
//! ```

pub mod router;

pub use router::Router;
