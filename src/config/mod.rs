//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment variables
//!     → loader.rs (read & parse, incl. backend lists)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow a zero-config start
//! - Validation separates syntactic (parsing) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BackendSpec, CircuitBreakerConfig, CorsConfig, GatewayConfig, HealthCheckConfig,
    LimitsConfig, RateLimitConfig, RedisConfig, RetryConfig, ServerConfig, ServiceConfig, Strategy,
    TimeoutConfig,
};
