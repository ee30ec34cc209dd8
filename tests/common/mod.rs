//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use api_gateway::config::{BackendSpec, GatewayConfig, ServiceConfig, Strategy};
use api_gateway::lifecycle::Shutdown;
use api_gateway::proxy::ReverseProxy;
use api_gateway::HttpServer;

/// Start a programmable mock backend on an ephemeral port. The callback
/// receives the request path and body and returns `(status, body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some((path, body)) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, response_body) = f(path, body).await;
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line(status),
                            response_body.len(),
                            response_body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock backend that answers every request with 200 and a fixed
/// body (including /health probes).
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_path, _body| async move { (200, body.to_string()) }).await
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        201 => "201 Created",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        504 => "504 Gateway Timeout",
        _ => "200 OK",
    }
}

/// Read one HTTP/1.1 request, returning its path and body.
async fn read_request(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = head
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)?
        .to_string();

    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some((path, buf[body_start..].to_vec()))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// A service config pointing at the given backend addresses.
pub fn service(name: &str, prefix: &str, backends: &[SocketAddr], strategy: Strategy) -> ServiceConfig {
    ServiceConfig {
        name: name.to_string(),
        path_prefix: prefix.to_string(),
        target_url: None,
        backends: backends
            .iter()
            .map(|addr| BackendSpec {
                url: format!("http://{addr}"),
                weight: 1,
            })
            .collect(),
        strip_path: false,
        strategy,
    }
}

/// Gateway config hardened for tests: no Redis-backed features, no
/// background prober, deterministic backoff.
pub fn test_config(services: Vec<ServiceConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.admin.enabled = false;
    config.rate_limit.enabled = false;
    config.health_check.enabled = false;
    config.retry.jitter_factor = 0.0;
    config.retry.initial_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config.services = services;
    config
}

/// Start a gateway on an ephemeral port; returns its address, the proxy
/// handle (for health manipulation) and the shutdown trigger.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Arc<ReverseProxy>, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config, None).expect("gateway construction failed");
    let proxy = server.proxy();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    // Give the listener task a beat to start accepting.
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, proxy, shutdown)
}

/// A reqwest client that never reuses pooled connections, so each
/// request exercises the full gateway path.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
