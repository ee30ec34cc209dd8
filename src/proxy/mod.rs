//! Proxy orchestration.
//!
//! # Data Flow
//! ```text
//! request → route match → breaker admit → select backend
//!     → buffer body (non-GET/HEAD, for retry replay)
//!     → retry loop: re-select per attempt, forward, record response
//!     → breaker + metrics bookkeeping on the FINAL status
//!     → response with X-Retry-Count / X-Backend
//! ```
//!
//! # Design Decisions
//! - One forwarder per backend, built once at startup
//! - Retries re-select a backend; the previous one is kept when the
//!   balancer has nothing better to offer
//! - Transport failures surface as 502 responses, giving transport and
//!   server-side failures uniform retry semantics

pub mod forwarder;

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, Method, Request, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{CircuitBreakerConfig, RetryConfig, ServiceConfig};
use crate::http::response::ApiError;
use crate::load_balancer::{Backend, LoadBalancer};
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, BreakerState, BreakerStats, Retryer};
use crate::routing::Router;
use forwarder::{ForwardedResponse, Forwarder};

/// Error type for proxy construction.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("service '{service}' backend '{url}' is not a valid URL")]
    InvalidBackendUrl { service: String, url: String },
}

struct ServiceProxy {
    config: ServiceConfig,
    load_balancer: LoadBalancer,
    forwarders: HashMap<String, Forwarder>,
}

/// Per-service backend health and weight, exposed on the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendStats {
    pub url: String,
    pub is_healthy: bool,
    pub weight: u32,
}

struct AttemptState {
    backend: Arc<Backend>,
    response: Option<ForwardedResponse>,
}

/// The request dispatch pipeline: composes routing, circuit breaking,
/// load balancing, retries and forwarding for every proxied request.
pub struct ReverseProxy {
    services: Vec<Arc<ServiceProxy>>,
    router: Router,
    registry: BreakerRegistry,
    retryer: Retryer,
    cancel: CancellationToken,
    max_body_bytes: usize,
}

impl ReverseProxy {
    pub fn new(
        services: &[ServiceConfig],
        breaker_config: CircuitBreakerConfig,
        retry_config: RetryConfig,
        max_body_bytes: usize,
        cancel: CancellationToken,
    ) -> Result<Self, ProxyError> {
        let client: Client<HttpConnector, Body> =
            Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let mut service_proxies = Vec::with_capacity(services.len());
        for svc in services {
            let specs = svc.backend_specs();
            for spec in &specs {
                if spec.url.parse::<Uri>().is_err() {
                    return Err(ProxyError::InvalidBackendUrl {
                        service: svc.name.clone(),
                        url: spec.url.clone(),
                    });
                }
            }

            let load_balancer = LoadBalancer::new(svc.strategy, &specs).map_err(|_| {
                ProxyError::InvalidBackendUrl {
                    service: svc.name.clone(),
                    url: specs.first().map(|s| s.url.clone()).unwrap_or_default(),
                }
            })?;

            let mut forwarders = HashMap::new();
            for backend in load_balancer.backends() {
                let strip_prefix = svc.strip_path.then(|| svc.path_prefix.clone());
                forwarders.insert(
                    backend.url.clone(),
                    Forwarder::new(
                        svc.name.clone(),
                        backend.clone(),
                        strip_prefix,
                        client.clone(),
                    ),
                );
            }

            tracing::info!(
                service = %svc.name,
                path = %svc.path_prefix,
                backends = forwarders.len(),
                strategy = svc.strategy.as_str(),
                "Service configured"
            );

            service_proxies.push(Arc::new(ServiceProxy {
                config: svc.clone(),
                load_balancer,
                forwarders,
            }));
        }

        let prefixes: Vec<String> = service_proxies
            .iter()
            .map(|s| s.config.path_prefix.clone())
            .collect();

        Ok(Self {
            services: service_proxies,
            router: Router::new(&prefixes),
            registry: BreakerRegistry::new(breaker_config),
            retryer: Retryer::new(retry_config),
            cancel,
            max_body_bytes,
        })
    }

    /// Dispatch one request through the full pipeline.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let Some(index) = self.router.match_path(request.uri().path()) else {
            return ApiError::not_found("No service matches the requested path").into_response();
        };
        let svc = self.services[index].clone();
        let service_name = svc.config.name.clone();

        let breaker = self.registry.get_or_create(&service_name);
        if !breaker.allow_request() {
            metrics::record_breaker_state(&service_name, breaker.state());
            return ApiError::service_unavailable(format!(
                "Circuit breaker is open for {service_name}"
            ))
            .into_response();
        }

        let Some(backend) = svc.load_balancer.select() else {
            return ApiError::service_unavailable(format!(
                "No healthy backends available for {service_name}"
            ))
            .into_response();
        };

        // Buffer the body so retries can replay identical bytes.
        let (parts, body) = request.into_parts();
        let body_bytes = if parts.method != Method::GET && parts.method != Method::HEAD {
            match axum::body::to_bytes(body, self.max_body_bytes).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return ApiError::bad_request(format!("Failed to read request body: {e}"))
                        .into_response()
                }
            }
        } else {
            Bytes::new()
        };
        let parts = Arc::new(parts);

        let start = Instant::now();
        let attempt_state = Arc::new(Mutex::new(AttemptState {
            backend,
            response: None,
        }));

        let result = self
            .retryer
            .execute(&self.cancel, |attempt| {
                let svc = svc.clone();
                let state = attempt_state.clone();
                let parts = parts.clone();
                let body = body_bytes.clone();
                let service = service_name.clone();
                async move {
                    if attempt > 0 {
                        // Prefer a different backend for the retry; keep
                        // the previous one if selection comes up empty.
                        if let Some(next) = svc.load_balancer.select() {
                            state.lock().expect("attempt state poisoned").backend = next;
                        }
                    }

                    let backend = state
                        .lock()
                        .expect("attempt state poisoned")
                        .backend
                        .clone();
                    let response = match svc.forwarders.get(&backend.url) {
                        Some(forwarder) => forwarder.forward(&parts, body).await,
                        None => missing_forwarder_response(&service, &backend.url),
                    };
                    let status = response.status.as_u16();

                    if attempt > 0 {
                        tracing::info!(
                            service = %service,
                            backend = %backend.url,
                            attempt = attempt + 1,
                            status = status,
                            "Retry attempt"
                        );
                    }

                    state.lock().expect("attempt state poisoned").response = Some(response);
                    (status, None)
                }
            })
            .await;

        metrics::record_service_request(&service_name, result.status_code, start.elapsed());

        // Only the settled outcome feeds the breaker; individual retry
        // attempts never do.
        let pre_state = breaker.state();
        if result.status_code >= 500 {
            breaker.record_failure();
        } else {
            breaker.record_success();
        }
        let post_state = breaker.state();
        metrics::record_breaker_state(&service_name, post_state);
        if post_state == BreakerState::Open && pre_state != BreakerState::Open {
            metrics::record_breaker_trip(&service_name);
        }

        let (forwarded, backend_authority) = {
            let mut state = attempt_state.lock().expect("attempt state poisoned");
            (state.response.take(), state.backend.authority.clone())
        };
        let Some(forwarded) = forwarded else {
            return ApiError::bad_gateway("Upstream request was not completed").into_response();
        };

        let mut response = Response::new(Body::from(forwarded.body));
        *response.status_mut() = forwarded.status;
        *response.headers_mut() = forwarded.headers;

        let headers = response.headers_mut();
        if result.retried {
            if let Ok(value) = HeaderValue::from_str(&(result.attempts - 1).to_string()) {
                headers.insert("X-Retry-Count", value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(&backend_authority) {
            headers.insert("X-Backend", value);
        }

        response
    }

    /// Configured services, in routing declaration order.
    pub fn services(&self) -> Vec<ServiceConfig> {
        self.services.iter().map(|s| s.config.clone()).collect()
    }

    /// Snapshots of every circuit breaker seen so far.
    pub fn breaker_stats(&self) -> Vec<BreakerStats> {
        self.registry.all_stats()
    }

    pub fn reset_breaker(&self, name: &str) -> bool {
        self.registry.reset_by_name(name)
    }

    pub fn reset_all_breakers(&self) {
        self.registry.reset_all()
    }

    /// Health-checker callback target: flip one backend's healthy flag.
    pub fn update_backend_health(&self, service: &str, url: &str, healthy: bool) {
        for svc in &self.services {
            if svc.config.name == service {
                svc.load_balancer.set_healthy(url, healthy);
                tracing::debug!(
                    service = %service,
                    backend = %url,
                    healthy = healthy,
                    "Backend health updated"
                );
                return;
            }
        }
    }

    /// Per-backend health and weight for one service.
    pub fn backend_stats(&self, service: &str) -> Option<Vec<BackendStats>> {
        self.services
            .iter()
            .find(|s| s.config.name == service)
            .map(|s| {
                s.load_balancer
                    .backends()
                    .iter()
                    .map(|b| BackendStats {
                        url: b.url.clone(),
                        is_healthy: b.is_healthy(),
                        weight: b.weight,
                    })
                    .collect()
            })
    }

    /// (healthy, total) backend counts for one service.
    pub fn healthy_count(&self, service: &str) -> Option<(usize, usize)> {
        self.services
            .iter()
            .find(|s| s.config.name == service)
            .map(|s| {
                (
                    s.load_balancer.healthy_count(),
                    s.load_balancer.backends().len(),
                )
            })
    }
}

fn missing_forwarder_response(service: &str, url: &str) -> ForwardedResponse {
    tracing::error!(service = %service, backend = %url, "No forwarder found for backend");
    let body = serde_json::json!({
        "error": "Internal error",
        "message": "Backend proxy not found",
    });
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    ForwardedResponse {
        status: axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        headers,
        body: Bytes::from(body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendSpec, Strategy};

    fn service(urls: &[&str]) -> ServiceConfig {
        ServiceConfig {
            name: "auth-service".into(),
            path_prefix: "/api/auth".into(),
            target_url: None,
            backends: urls
                .iter()
                .map(|u| BackendSpec {
                    url: u.to_string(),
                    weight: 1,
                })
                .collect(),
            strip_path: false,
            strategy: Strategy::RoundRobin,
        }
    }

    fn proxy(services: &[ServiceConfig]) -> ReverseProxy {
        ReverseProxy::new(
            services,
            CircuitBreakerConfig::default(),
            RetryConfig::default(),
            1024 * 1024,
            CancellationToken::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn invalid_backend_url_fails_construction() {
        let result = ReverseProxy::new(
            &[service(&["http://bad url:1"])],
            CircuitBreakerConfig::default(),
            RetryConfig::default(),
            1024,
            CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(ProxyError::InvalidBackendUrl { .. })
        ));
    }

    #[tokio::test]
    async fn route_miss_returns_not_found() {
        let proxy = proxy(&[service(&["http://127.0.0.1:1"])]);
        let request = Request::builder()
            .uri("/unknown/path")
            .body(Body::empty())
            .unwrap();
        let response = proxy.handle(request).await;
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn no_healthy_backends_returns_service_unavailable() {
        let proxy = proxy(&[service(&["http://127.0.0.1:1"])]);
        proxy.update_backend_health("auth-service", "http://127.0.0.1:1", false);

        let request = Request::builder()
            .uri("/api/auth/login")
            .body(Body::empty())
            .unwrap();
        let response = proxy.handle(request).await;
        assert_eq!(
            response.status(),
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn backend_stats_reflect_health() {
        let proxy = proxy(&[service(&["http://a:1", "http://b:1"])]);
        proxy.update_backend_health("auth-service", "http://b:1", false);

        let stats = proxy.backend_stats("auth-service").unwrap();
        assert_eq!(stats.len(), 2);
        let b = stats.iter().find(|s| s.url == "http://b:1").unwrap();
        assert!(!b.is_healthy);
        assert_eq!(proxy.healthy_count("auth-service"), Some((1, 2)));
        assert!(proxy.backend_stats("missing").is_none());
    }
}
