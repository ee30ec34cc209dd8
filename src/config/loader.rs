//! Configuration loading from the environment.
//!
//! Every knob is an environment variable with a default, so the gateway
//! starts with zero configuration in front of the two demo services.

use std::env;
use std::str::FromStr;

use crate::config::schema::{
    BackendSpec, GatewayConfig, ServiceConfig, Strategy,
};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from environment variables.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();

    config.server.host = get_env("HOST", &config.server.host);
    config.server.port = get_env_parsed("PORT", config.server.port);

    config.redis.host = get_env("REDIS_HOST", &config.redis.host);
    config.redis.port = get_env_parsed("REDIS_PORT", config.redis.port);
    config.redis.password = get_env("REDIS_PASSWORD", "");
    config.redis.db = get_env_parsed("REDIS_DB", config.redis.db);

    config.rate_limit.enabled = get_env_parsed("RATE_LIMIT_ENABLED", config.rate_limit.enabled);
    config.rate_limit.requests_per_minute =
        get_env_parsed("RATE_LIMIT_RPM", config.rate_limit.requests_per_minute);
    config.rate_limit.burst_size = get_env_parsed("RATE_LIMIT_BURST", config.rate_limit.burst_size);

    config.circuit_breaker.max_failures =
        get_env_parsed("CB_MAX_FAILURES", config.circuit_breaker.max_failures);
    config.circuit_breaker.reset_timeout_secs = get_env_parsed(
        "CB_RESET_TIMEOUT_SECONDS",
        config.circuit_breaker.reset_timeout_secs,
    );
    config.circuit_breaker.half_open_max_requests = get_env_parsed(
        "CB_HALF_OPEN_MAX_REQUESTS",
        config.circuit_breaker.half_open_max_requests,
    );
    config.circuit_breaker.success_threshold = get_env_parsed(
        "CB_SUCCESS_THRESHOLD",
        config.circuit_breaker.success_threshold,
    );

    config.retry.max_retries = get_env_parsed("RETRY_MAX_RETRIES", config.retry.max_retries);
    config.retry.initial_delay_ms =
        get_env_parsed("RETRY_INITIAL_DELAY_MS", config.retry.initial_delay_ms);
    config.retry.max_delay_ms = get_env_parsed("RETRY_MAX_DELAY_MS", config.retry.max_delay_ms);
    config.retry.multiplier = get_env_parsed("RETRY_MULTIPLIER", config.retry.multiplier);
    config.retry.jitter_factor = get_env_parsed("RETRY_JITTER_FACTOR", config.retry.jitter_factor);

    config.admin.username = get_env("ADMIN_USERNAME", &config.admin.username);
    config.admin.password = get_env("ADMIN_PASSWORD", "");
    config.admin.enabled = get_env_parsed("ADMIN_AUTH_ENABLED", config.admin.enabled);

    config.health_check.enabled =
        get_env_parsed("HEALTH_CHECK_ENABLED", config.health_check.enabled);
    config.health_check.interval_secs = get_env_parsed(
        "HEALTH_CHECK_INTERVAL_SECS",
        config.health_check.interval_secs,
    );
    config.health_check.timeout_secs =
        get_env_parsed("HEALTH_CHECK_TIMEOUT_SECS", config.health_check.timeout_secs);

    config.timeouts.request_secs =
        get_env_parsed("REQUEST_TIMEOUT_SECS", config.timeouts.request_secs);
    config.limits.max_body_bytes =
        get_env_parsed("MAX_BODY_BYTES", config.limits.max_body_bytes);

    config.services = load_services_from_env();

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Demo services, each overridable through `{PREFIX}_URL`,
/// `{PREFIX}_BACKENDS` and `{PREFIX}_STRATEGY`.
fn load_services_from_env() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig {
            name: "auth-service".to_string(),
            path_prefix: "/api/auth".to_string(),
            target_url: Some(get_env("AUTH_SERVICE_URL", "http://localhost:8080")),
            backends: parse_backends_env("AUTH_SERVICE_BACKENDS"),
            strip_path: false,
            strategy: Strategy::parse(&get_env("AUTH_SERVICE_STRATEGY", "round-robin")),
        },
        ServiceConfig {
            name: "user-service".to_string(),
            path_prefix: "/api/users".to_string(),
            target_url: Some(get_env("USER_SERVICE_URL", "http://localhost:8082")),
            backends: parse_backends_env("USER_SERVICE_BACKENDS"),
            strip_path: false,
            strategy: Strategy::parse(&get_env("USER_SERVICE_STRATEGY", "round-robin")),
        },
    ]
}

/// Parse a comma-separated backend list from an environment variable.
///
/// Format: `URL1,URL2` or `URL1:weight1,URL2:weight2`. A trailing
/// `:<digits>` counts as a weight only when the remainder still contains a
/// colon (scheme or host:port); otherwise it is a port.
fn parse_backends_env(key: &str) -> Vec<BackendSpec> {
    let value = match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => return Vec::new(),
    };
    parse_backend_list(&value)
}

fn parse_backend_list(value: &str) -> Vec<BackendSpec> {
    let mut backends = Vec::new();

    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some(idx) = part.rfind(':') {
            let suffix = &part[idx + 1..];
            if let Ok(weight) = suffix.parse::<u32>() {
                if !suffix.contains('/') {
                    let remainder = &part[..idx];
                    if remainder.matches(':').count() >= 1 {
                        backends.push(BackendSpec {
                            url: remainder.to_string(),
                            weight,
                        });
                        continue;
                    }
                }
            }
        }

        backends.push(BackendSpec {
            url: part.to_string(),
            weight: 1,
        });
    }

    backends
}

fn get_env(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn get_env_parsed<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or(default),
        _ => default,
    }
}
