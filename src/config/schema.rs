//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! gateway. All types derive Serde traits; every section has defaults so a
//! bare environment still yields a runnable config.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind host/port).
    pub server: ServerConfig,

    /// Redis connection settings (rate limiter, API keys).
    pub redis: RedisConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker configuration (shared by all services).
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retry: RetryConfig,

    /// Admin endpoint authentication.
    pub admin: AdminConfig,

    /// Active health checking of backend instances.
    pub health_check: HealthCheckConfig,

    /// Request handling timeouts.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// CORS settings.
    pub cors: CorsConfig,

    /// Proxied service definitions.
    pub services: Vec<ServiceConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host (e.g. "0.0.0.0").
    pub host: String,

    /// Bind port.
    pub port: u16,
}

impl ServerConfig {
    /// The full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

impl RedisConfig {
    /// Connection URL in the form `redis://[:password@]host:port/db`.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting. Requires a Redis connection.
    pub enabled: bool,

    /// Allowed requests per window.
    pub requests_per_minute: u32,

    /// Token bucket capacity for bursts.
    pub burst_size: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            burst_size: 10,
            window_secs: 60,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub max_failures: u32,

    /// Seconds to wait in open state before probing.
    pub reset_timeout_secs: u64,

    /// Concurrent probe requests admitted in half-open state.
    pub half_open_max_requests: u32,

    /// Consecutive successes needed to close the circuit again.
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout_secs: 30,
            half_open_max_requests: 3,
            success_threshold: 2,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial call (0 = no retries).
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Backoff multiplier applied per retry.
    pub multiplier: f64,

    /// Jitter fraction in [0, 1] applied to each delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Admin endpoint authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Protect `/admin` paths with HTTP Basic auth.
    pub enabled: bool,

    pub username: String,

    /// Must be non-empty when `enabled` is true.
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            username: "admin".to_string(),
            password: String::new(),
        }
    }
}

/// Active health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background prober.
    pub enabled: bool,

    /// Seconds between probe rounds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body buffered for retry replay, in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Load balancing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
}

impl Strategy {
    /// Parse a strategy name; anything unrecognized falls back to
    /// round-robin.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Strategy::Random,
            _ => Strategy::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::Random => "random",
        }
    }
}

/// A single backend instance of a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSpec {
    /// Absolute URL with scheme and host.
    pub url: String,

    /// Relative weight (carried for future weighted strategies).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// A proxied service: a path prefix bound to a group of backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service name.
    pub name: String,

    /// Path prefix routed to this service (leading `/`).
    pub path_prefix: String,

    /// Legacy single-target form; equivalent to one backend with weight 1.
    #[serde(default)]
    pub target_url: Option<String>,

    /// Backend instances.
    #[serde(default)]
    pub backends: Vec<BackendSpec>,

    /// Strip the path prefix before forwarding.
    #[serde(default)]
    pub strip_path: bool,

    /// Backend selection strategy.
    #[serde(default)]
    pub strategy: Strategy,
}

impl ServiceConfig {
    /// Backend list with legacy single-target fallback.
    pub fn backend_specs(&self) -> Vec<BackendSpec> {
        if !self.backends.is_empty() {
            return self.backends.clone();
        }
        if let Some(url) = &self.target_url {
            if !url.is_empty() {
                return vec![BackendSpec {
                    url: url.clone(),
                    weight: 1,
                }];
            }
        }
        Vec::new()
    }
}
