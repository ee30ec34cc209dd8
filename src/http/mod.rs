//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router + middleware chain)
//!     → management/admin handlers, or
//!     → fallback → proxy pipeline
//!     → response.rs (JSON envelope for gateway-originated errors)
//! ```

pub mod handlers;
pub mod response;
pub mod server;

pub use response::ApiError;
pub use server::{GatewayState, HttpServer};
