//! Failure injection: active health checking driving traffic away from
//! failing backends, and recovery afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::Strategy;

mod common;

#[tokio::test]
async fn health_checker_evicts_and_restores_backend() {
    let backend_a = common::start_mock_backend("a").await;

    let b_healthy = Arc::new(AtomicBool::new(true));
    let bh = b_healthy.clone();
    let backend_b = common::start_programmable_backend(move |_path, _body| {
        let bh = bh.clone();
        async move {
            if bh.load(Ordering::SeqCst) {
                (200, "b".to_string())
            } else {
                (500, "dead".to_string())
            }
        }
    })
    .await;

    let mut config = common::test_config(vec![common::service(
        "user-service",
        "/api/users",
        &[backend_a, backend_b],
        Strategy::RoundRobin,
    )]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    config.retry.max_retries = 0;
    let (addr, _, shutdown) = common::start_gateway(config).await;
    let client = common::http_client();
    let url = format!("http://{addr}/api/users");

    // Both healthy: both backends serve traffic.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let (mut a_hits, mut b_hits) = (0, 0);
    for _ in 0..20 {
        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        match body.as_str() {
            "a" => a_hits += 1,
            "b" => b_hits += 1,
            other => panic!("unexpected body {other:?}"),
        }
    }
    assert!(a_hits > 0 && b_hits > 0, "round robin should hit both (a={a_hits}, b={b_hits})");

    // Kill b; the prober marks it unhealthy and the balancer skips it.
    b_healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    for _ in 0..10 {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.text().await.unwrap(), "a");
    }

    // Recovery: b comes back and rejoins the rotation.
    b_healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let mut b_after_recovery = 0;
    for _ in 0..20 {
        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        if body == "b" {
            b_after_recovery += 1;
        }
    }
    assert!(b_after_recovery > 0, "b should rejoin rotation after recovery");

    shutdown.trigger();
}

#[tokio::test]
async fn services_health_reports_probe_results() {
    let backend = common::start_mock_backend("ok").await;
    let dead: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();

    let mut config = common::test_config(vec![common::service(
        "auth-service",
        "/api/auth",
        &[backend, dead],
        Strategy::RoundRobin,
    )]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    let (addr, _, shutdown) = common::start_gateway(config).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let res = common::http_client()
        .get(format!("http://{addr}/services/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();

    let services = body["services"].as_array().unwrap();
    assert_eq!(services.len(), 1);
    let svc = &services[0];
    assert_eq!(svc["name"], "auth-service");
    // One live instance keeps the aggregate healthy.
    assert_eq!(svc["status"], "healthy");

    let instances = svc["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 2);
    let live = instances
        .iter()
        .find(|i| i["url"] == format!("http://{backend}"))
        .unwrap();
    assert_eq!(live["status"], "healthy");
    let down = instances
        .iter()
        .find(|i| i["url"] == format!("http://{dead}"))
        .unwrap();
    assert_eq!(down["status"], "unhealthy");
    assert!(down["error_message"].as_str().is_some());

    shutdown.trigger();
}

#[tokio::test]
async fn all_backends_down_returns_service_unavailable() {
    let backend = common::start_mock_backend("up").await;
    let config = common::test_config(vec![common::service(
        "auth-service",
        "/api/auth",
        &[backend],
        Strategy::RoundRobin,
    )]);
    let (addr, proxy, shutdown) = common::start_gateway(config).await;

    proxy.update_backend_health("auth-service", &format!("http://{backend}"), false);

    let res = common::http_client()
        .get(format!("http://{addr}/api/auth"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("No healthy backends available"));

    shutdown.trigger();
}

#[tokio::test]
async fn transport_failure_maps_to_bad_gateway() {
    // Nothing listens here; connections are refused immediately.
    let dead: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();

    let mut config = common::test_config(vec![common::service(
        "auth-service",
        "/api/auth",
        &[dead],
        Strategy::RoundRobin,
    )]);
    config.retry.max_retries = 1;
    let (addr, _, shutdown) = common::start_gateway(config).await;

    let res = common::http_client()
        .get(format!("http://{addr}/api/auth"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    // The 502 is retryable, so the failed attempt was retried once.
    assert_eq!(
        res.headers().get("X-Retry-Count").unwrap().to_str().unwrap(),
        "1"
    );
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Service unavailable");

    shutdown.trigger();
}
