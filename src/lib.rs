//! Reverse-proxy API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!  Client ──▶ middleware chain ──▶ routing ──▶ proxy pipeline ──▶ Backend
//!            (recover, metrics,   (longest    (breaker admit,
//!             tracing, CORS,       prefix)     select backend,
//!             admin auth,                      buffer body,
//!             API keys,                        retry + forward)
//!             rate limit)
//!
//!  Cross-cutting: config (env), health checker → load balancer
//!  callbacks, observability (tracing + metrics), lifecycle (shutdown).
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod proxy;
pub mod routing;

// Traffic management
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
