//! Backend health snapshot types.
//!
//! # States
//! - Unknown: no probe has completed yet
//! - Healthy: last probe returned 2xx
//! - Unhealthy: last probe failed or returned non-2xx
//!
//! A service aggregates to healthy when at least one instance is healthy.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Probe-derived status of an instance or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

/// Health of a single backend instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceHealth {
    pub url: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    pub response_time_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl InstanceHealth {
    pub fn unknown(url: String) -> Self {
        Self {
            url,
            status: HealthStatus::Unknown,
            last_check: None,
            response_time_ms: 0,
            error_message: String::new(),
        }
    }
}

/// Aggregated health of a service with its instances.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub instances: Vec<InstanceHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    pub response_time_ms: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl ServiceHealth {
    /// Recompute aggregate fields from the instance list: healthy iff at
    /// least one instance is healthy, unknown until any probe has run.
    pub fn recompute(&mut self) {
        if self.instances.is_empty() {
            return;
        }

        let healthy = self
            .instances
            .iter()
            .filter(|i| i.status == HealthStatus::Healthy)
            .count();
        let probed = self
            .instances
            .iter()
            .any(|i| i.status != HealthStatus::Unknown);

        self.status = if !probed {
            HealthStatus::Unknown
        } else if healthy > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        self.response_time_ms = self
            .instances
            .iter()
            .map(|i| i.response_time_ms)
            .sum::<i64>()
            / self.instances.len() as i64;
        self.last_check = self.instances.iter().filter_map(|i| i.last_check).max();
        self.error_message = if healthy == self.instances.len() {
            String::new()
        } else {
            self.instances
                .iter()
                .rev()
                .find(|i| !i.error_message.is_empty())
                .map(|i| i.error_message.clone())
                .unwrap_or_default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(statuses: &[HealthStatus]) -> ServiceHealth {
        ServiceHealth {
            name: "svc".into(),
            status: HealthStatus::Unknown,
            instances: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| InstanceHealth {
                    url: format!("http://b{}:1", i),
                    status: *s,
                    last_check: Some(Utc::now()),
                    response_time_ms: 10,
                    error_message: if *s == HealthStatus::Unhealthy {
                        "connection refused".into()
                    } else {
                        String::new()
                    },
                })
                .collect(),
            last_check: None,
            response_time_ms: 0,
            error_message: String::new(),
        }
    }

    #[test]
    fn one_healthy_instance_is_enough() {
        let mut svc = service(&[HealthStatus::Unhealthy, HealthStatus::Healthy]);
        svc.recompute();
        assert_eq!(svc.status, HealthStatus::Healthy);
    }

    #[test]
    fn all_unhealthy_aggregates_unhealthy() {
        let mut svc = service(&[HealthStatus::Unhealthy, HealthStatus::Unhealthy]);
        svc.recompute();
        assert_eq!(svc.status, HealthStatus::Unhealthy);
        assert_eq!(svc.error_message, "connection refused");
    }

    #[test]
    fn unprobed_service_stays_unknown() {
        let mut svc = service(&[HealthStatus::Unknown, HealthStatus::Unknown]);
        for instance in &mut svc.instances {
            instance.last_check = None;
        }
        svc.recompute();
        assert_eq!(svc.status, HealthStatus::Unknown);
    }

    #[test]
    fn fully_healthy_clears_error() {
        let mut svc = service(&[HealthStatus::Healthy, HealthStatus::Healthy]);
        svc.instances[0].error_message = "stale".into();
        svc.recompute();
        assert_eq!(svc.status, HealthStatus::Healthy);
        assert!(svc.error_message.is_empty());
    }
}
