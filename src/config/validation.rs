//! Configuration validation logic.

use axum::http::Uri;
use std::collections::HashSet;

use crate::config::schema::GatewayConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation error: {}", self.0)
    }
}

/// Validate a GatewayConfig for semantic correctness.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut names = HashSet::new();
    for svc in &config.services {
        if !names.insert(svc.name.as_str()) {
            errors.push(ValidationError(format!(
                "duplicate service name '{}'",
                svc.name
            )));
        }

        if !svc.path_prefix.starts_with('/') {
            errors.push(ValidationError(format!(
                "service '{}' path prefix '{}' must start with '/'",
                svc.name, svc.path_prefix
            )));
        }

        let backends = svc.backend_specs();
        if backends.is_empty() {
            errors.push(ValidationError(format!(
                "service '{}' has no backends",
                svc.name
            )));
        }

        for backend in &backends {
            match backend.url.parse::<Uri>() {
                Ok(uri) if uri.scheme().is_some() && uri.host().is_some() => {}
                _ => errors.push(ValidationError(format!(
                    "service '{}' backend '{}' is not an absolute URL",
                    svc.name, backend.url
                ))),
            }
            if backend.weight == 0 {
                errors.push(ValidationError(format!(
                    "service '{}' backend '{}' has zero weight",
                    svc.name, backend.url
                )));
            }
        }
    }

    if config.admin.enabled && config.admin.password.is_empty() {
        errors.push(ValidationError(
            "admin auth is enabled but no password is set".to_string(),
        ));
    }

    if config.circuit_breaker.max_failures == 0 {
        errors.push(ValidationError(
            "circuit_breaker.max_failures must be > 0".to_string(),
        ));
    }
    if config.circuit_breaker.success_threshold == 0 {
        errors.push(ValidationError(
            "circuit_breaker.success_threshold must be > 0".to_string(),
        ));
    }

    if config.rate_limit.enabled && config.rate_limit.requests_per_minute == 0 {
        errors.push(ValidationError(
            "rate_limit.requests_per_minute must be > 0".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;

    fn base_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.admin.enabled = false;
        config.services.push(ServiceConfig {
            name: "auth-service".into(),
            path_prefix: "/api/auth".into(),
            target_url: None,
            backends: vec![BackendSpec {
                url: "http://127.0.0.1:8080".into(),
                weight: 1,
            }],
            strip_path: false,
            strategy: Strategy::RoundRobin,
        });
        config
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn duplicate_service_name() {
        let mut config = base_config();
        let dup = config.services[0].clone();
        config.services.push(dup);
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("duplicate service name")));
    }

    #[test]
    fn relative_backend_url_rejected() {
        let mut config = base_config();
        config.services[0].backends[0].url = "localhost:8080".into();
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("absolute URL")));
    }

    #[test]
    fn prefix_must_lead_with_slash() {
        let mut config = base_config();
        config.services[0].path_prefix = "api/auth".into();
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("must start with '/'")));
    }

    #[test]
    fn admin_enabled_requires_password() {
        let mut config = base_config();
        config.admin.enabled = true;
        config.admin.password = String::new();
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("no password")));
    }

    #[test]
    fn service_without_backends_rejected() {
        let mut config = base_config();
        config.services[0].backends.clear();
        config.services[0].target_url = None;
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("no backends")));
    }
}
