//! Metrics collection and exposition.
//!
//! Two sinks are fed from the same helper functions: the Prometheus
//! recorder (rendered as text by the /metrics endpoint) and a lightweight
//! snapshot registry of atomics that backs the JSON variant of the same
//! endpoint.

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::resilience::BreakerState;

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();
static SNAPSHOT: OnceLock<Snapshot> = OnceLock::new();

#[derive(Default)]
struct ServiceCounters {
    requests: AtomicU64,
    errors: AtomicU64,
}

struct Snapshot {
    start: Instant,
    requests_total: AtomicU64,
    in_flight: AtomicI64,
    rate_limited_total: AtomicU64,
    services: DashMap<String, ServiceCounters>,
    breaker_states: DashMap<String, &'static str>,
}

fn snapshot() -> &'static Snapshot {
    SNAPSHOT.get_or_init(|| Snapshot {
        start: Instant::now(),
        requests_total: AtomicU64::new(0),
        in_flight: AtomicI64::new(0),
        rate_limited_total: AtomicU64::new(0),
        services: DashMap::new(),
        breaker_states: DashMap::new(),
    })
}

/// Install the Prometheus recorder. Call once at startup; later calls are
/// no-ops so tests can construct servers freely.
pub fn init() {
    if PROMETHEUS.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS.set(handle);
        }
        Err(e) => tracing::warn!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Record a completed HTTP request at the gateway boundary.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", normalize_path(path)),
        ("status", status.to_string()),
    ];
    counter!("gateway_http_requests_total", &labels).increment(1);
    histogram!("gateway_http_request_duration_seconds", &labels).record(duration.as_secs_f64());

    snapshot().requests_total.fetch_add(1, Ordering::Relaxed);
}

/// Record a proxied request to a backend service, keyed by final status.
pub fn record_service_request(service: &str, status: u16, latency: Duration) {
    let labels = [
        ("service", service.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_backend_requests_total", &labels).increment(1);
    histogram!(
        "gateway_backend_request_duration_seconds",
        "service" => service.to_string()
    )
    .record(latency.as_secs_f64());

    let snap = snapshot();
    let entry = snap.services.entry(service.to_string()).or_default();
    entry.requests.fetch_add(1, Ordering::Relaxed);
    if status >= 500 {
        entry.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Count a rate-limited (429) admission decision.
pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
    snapshot().rate_limited_total.fetch_add(1, Ordering::Relaxed);
}

/// Record the probed health of a backend instance.
pub fn record_backend_health(service: &str, url: &str, healthy: bool) {
    gauge!(
        "gateway_backend_healthy",
        "service" => service.to_string(),
        "backend" => url.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a breaker state (1 = closed, 0.5 = half-open, 0 = open).
pub fn record_breaker_state(service: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 1.0,
        BreakerState::HalfOpen => 0.5,
        BreakerState::Open => 0.0,
    };
    gauge!("gateway_circuit_breaker_state", "service" => service.to_string()).set(value);
    snapshot()
        .breaker_states
        .insert(service.to_string(), state.as_str());
}

/// Count a breaker trip (transition into open).
pub fn record_breaker_trip(service: &str) {
    counter!("gateway_circuit_breaker_trips_total", "service" => service.to_string()).increment(1);
}

/// RAII guard for the in-flight request gauge.
pub struct InFlightGuard;

impl InFlightGuard {
    fn new() -> Self {
        let current = snapshot().in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("gateway_requests_in_flight").set(current as f64);
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let current = snapshot().in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("gateway_requests_in_flight").set(current as f64);
    }
}

/// Axum middleware recording request totals, duration and in-flight count.
/// The /metrics endpoint itself is skipped to avoid self-counting.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    if request.uri().path() == "/metrics" {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let _guard = InFlightGuard::new();

    let response = next.run(request).await;

    record_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

/// Prometheus text exposition of every recorded metric.
pub fn render_prometheus() -> String {
    PROMETHEUS
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// JSON summary for `Accept: application/json` on /metrics.
pub fn json_summary() -> serde_json::Value {
    let snap = snapshot();

    let mut service_requests = serde_json::Map::new();
    let mut service_errors = serde_json::Map::new();
    for entry in snap.services.iter() {
        service_requests.insert(
            entry.key().clone(),
            entry.value().requests.load(Ordering::Relaxed).into(),
        );
        service_errors.insert(
            entry.key().clone(),
            entry.value().errors.load(Ordering::Relaxed).into(),
        );
    }

    let mut breakers = serde_json::Map::new();
    for entry in snap.breaker_states.iter() {
        breakers.insert(entry.key().clone(), (*entry.value()).into());
    }

    serde_json::json!({
        "uptime_seconds": snap.start.elapsed().as_secs_f64(),
        "requests_total": snap.requests_total.load(Ordering::Relaxed),
        "requests_in_flight": snap.in_flight.load(Ordering::Relaxed),
        "rate_limited_total": snap.rate_limited_total.load(Ordering::Relaxed),
        "service_requests": service_requests,
        "service_errors": service_errors,
        "circuit_breakers": breakers,
    })
}

/// Replace numeric and UUID path segments with `:id` to keep metric label
/// cardinality bounded.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if looks_like_id(segment) { ":id" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_id(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    if segment.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }

    // UUID shape: 36 chars, hyphens at fixed offsets.
    segment.len() == 36
        && segment.bytes().enumerate().all(|(i, b)| match i {
            8 | 13 | 18 | 23 => b == b'-',
            _ => b.is_ascii_hexdigit(),
        })
}
