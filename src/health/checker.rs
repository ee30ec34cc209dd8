//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe `GET {backend}/health` on every instance
//! - Fan probes out concurrently, join before the next round
//! - Record per-instance status, response time and error message
//! - Fire change callbacks so the load balancers track the healthy set

use axum::body::Body;
use futures::future::join_all;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::health::state::{HealthStatus, InstanceHealth, ServiceHealth};
use crate::observability::metrics;

/// Called with `(service, instance_url, healthy)` on each health
/// transition. Runs synchronously on the prober path and must not block.
pub type HealthCallback = Arc<dyn Fn(&str, &str, bool) + Send + Sync>;

/// Periodic prober for all configured backend instances.
pub struct HealthChecker {
    services: Vec<ServiceConfig>,
    interval: Duration,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
    state: RwLock<HashMap<String, ServiceHealth>>,
    callbacks: RwLock<Vec<HealthCallback>>,
    stop: CancellationToken,
}

impl HealthChecker {
    pub fn new(services: Vec<ServiceConfig>, interval: Duration, timeout: Duration) -> Self {
        let mut state = HashMap::new();
        for svc in &services {
            let instances = svc
                .backend_specs()
                .iter()
                .map(|b| InstanceHealth::unknown(b.url.clone()))
                .collect();
            state.insert(
                svc.name.clone(),
                ServiceHealth {
                    name: svc.name.clone(),
                    status: HealthStatus::Unknown,
                    instances,
                    last_check: None,
                    response_time_ms: 0,
                    error_message: String::new(),
                },
            );
        }

        Self {
            services,
            interval,
            timeout,
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            state: RwLock::new(state),
            callbacks: RwLock::new(Vec::new()),
            stop: CancellationToken::new(),
        }
    }

    /// Register a callback fired on every instance health transition.
    pub fn register_callback(&self, cb: HealthCallback) {
        self.callbacks.write().expect("callback lock poisoned").push(cb);
    }

    /// Run the probe loop until stopped. The first round runs immediately.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    tracing::info!("Health checker stopped");
                    return;
                }
                _ = ticker.tick() => self.check_all().await,
            }
        }
    }

    /// Signal the probe loop to stop. Safe to call more than once.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    async fn check_all(&self) {
        let mut probes = Vec::new();
        for svc in &self.services {
            for backend in svc.backend_specs() {
                let service = svc.name.clone();
                let url = backend.url.clone();
                probes.push(async move {
                    let outcome = self.probe(&url).await;
                    (service, url, outcome)
                });
            }
        }

        for (service, url, outcome) in join_all(probes).await {
            self.apply_probe_result(&service, &url, outcome);
        }

        let mut state = self.state.write().expect("health state lock poisoned");
        for svc in state.values_mut() {
            svc.recompute();
        }
    }

    /// Probe one instance; 2xx within the timeout counts as healthy.
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();
        let health_url = format!("{}/health", url);

        let uri = match health_url.parse::<axum::http::Uri>() {
            Ok(uri) => uri,
            Err(e) => {
                return ProbeOutcome {
                    status: HealthStatus::Unhealthy,
                    response_time_ms: 0,
                    error_message: e.to_string(),
                }
            }
        };

        let request = axum::http::Request::builder()
            .method(axum::http::Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("health probe request is statically valid");

        let response = tokio::time::timeout(self.timeout, self.client.request(request)).await;
        let response_time_ms = start.elapsed().as_millis() as i64;

        match response {
            Ok(Ok(resp)) if resp.status().is_success() => ProbeOutcome {
                status: HealthStatus::Healthy,
                response_time_ms,
                error_message: String::new(),
            },
            Ok(Ok(resp)) => ProbeOutcome {
                status: HealthStatus::Unhealthy,
                response_time_ms,
                error_message: format!("unhealthy status code: {}", resp.status()),
            },
            Ok(Err(e)) => ProbeOutcome {
                status: HealthStatus::Unhealthy,
                response_time_ms,
                error_message: e.to_string(),
            },
            Err(_) => ProbeOutcome {
                status: HealthStatus::Unhealthy,
                response_time_ms,
                error_message: format!("health check timed out after {:?}", self.timeout),
            },
        }
    }

    fn apply_probe_result(&self, service: &str, url: &str, outcome: ProbeOutcome) {
        let changed = {
            let mut state = self.state.write().expect("health state lock poisoned");
            let Some(svc) = state.get_mut(service) else {
                return;
            };
            let Some(instance) = svc.instances.iter_mut().find(|i| i.url == url) else {
                return;
            };

            let changed = instance.status != outcome.status;
            instance.status = outcome.status;
            instance.last_check = Some(chrono::Utc::now());
            instance.response_time_ms = outcome.response_time_ms;
            instance.error_message = outcome.error_message.clone();
            changed
        };

        if outcome.status == HealthStatus::Unhealthy {
            tracing::warn!(
                service = %service,
                instance = %url,
                error = %outcome.error_message,
                "Health check failed"
            );
        } else {
            tracing::debug!(
                service = %service,
                instance = %url,
                response_time_ms = outcome.response_time_ms,
                "Health check passed"
            );
        }

        if changed {
            let healthy = outcome.status == HealthStatus::Healthy;
            metrics::record_backend_health(service, url, healthy);
            self.notify_callbacks(service, url, healthy);
        }
    }

    fn notify_callbacks(&self, service: &str, url: &str, healthy: bool) {
        let callbacks = self
            .callbacks
            .read()
            .expect("callback lock poisoned")
            .clone();
        for cb in callbacks {
            cb(service, url, healthy);
        }
    }

    /// Aggregated health of one service.
    pub fn get_health(&self, service: &str) -> Option<ServiceHealth> {
        self.state
            .read()
            .expect("health state lock poisoned")
            .get(service)
            .cloned()
    }

    /// Aggregated health of every service.
    pub fn get_all_health(&self) -> Vec<ServiceHealth> {
        let mut all: Vec<ServiceHealth> = self
            .state
            .read()
            .expect("health state lock poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Health of a single instance.
    pub fn get_instance_health(&self, service: &str, url: &str) -> Option<InstanceHealth> {
        self.state
            .read()
            .expect("health state lock poisoned")
            .get(service)
            .and_then(|svc| svc.instances.iter().find(|i| i.url == url).cloned())
    }
}

struct ProbeOutcome {
    status: HealthStatus,
    response_time_ms: i64,
    error_message: String,
}
