//! Distributed token-bucket rate limiting backed by Redis.
//!
//! Each client key owns a bucket stored under two Redis keys (float
//! tokens and a last-update timestamp), refilled continuously at
//! `requests_per_window / window` tokens per second and capped at the
//! burst size. The read-modify-write is not atomic across the two keys;
//! under contention two callers can both be admitted on the same token.
//! Accepted for per-key traffic levels here; a server-side Lua script is
//! the upgrade path.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::aio::MultiplexedConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::http::response::ApiError;
use crate::http::GatewayState;
use crate::observability::metrics;
use crate::security::api_key::ApiKey;

/// Admission decision for one request.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Error type for rate limiter failures.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Token-bucket rate limiter over a shared Redis connection.
#[derive(Clone)]
pub struct RateLimiter {
    conn: MultiplexedConnection,
    requests_per_window: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(conn: MultiplexedConnection, requests_per_window: u32, window: Duration) -> Self {
        Self {
            conn,
            requests_per_window,
            window,
        }
    }

    /// Check and consume one token from the bucket for `key`.
    pub async fn allow_with_burst(
        &self,
        key: &str,
        burst_size: u32,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let mut conn = self.conn.clone();
        let bucket_key = format!("ratelimit:bucket:{key}");
        let last_key = format!("ratelimit:last:{key}");

        let (tokens_raw, last_raw): (Option<String>, Option<String>) = redis::pipe()
            .get(&bucket_key)
            .get(&last_key)
            .query_async(&mut conn)
            .await?;

        let now_ns = unix_nanos();
        let tokens = tokens_raw
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(burst_size as f64);
        let last_ns = last_raw.and_then(|s| s.parse::<i128>().ok()).unwrap_or(now_ns);

        let elapsed_secs = ((now_ns - last_ns).max(0)) as f64 / 1e9;
        let rate = self.requests_per_window as f64 / self.window.as_secs_f64();
        let mut tokens = replenish(tokens, elapsed_secs, rate, burst_size as f64);

        let allowed = tokens >= 1.0;
        if allowed {
            tokens -= 1.0;
        }

        let ttl_secs = self.window.as_secs() * 2;
        redis::pipe()
            .set_ex(&bucket_key, tokens.to_string(), ttl_secs)
            .ignore()
            .set_ex(&last_key, now_ns.to_string(), ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(RateLimitDecision {
            allowed,
            remaining: tokens.floor().max(0.0) as u32,
            reset_after: Duration::from_secs_f64(1.0 / rate),
        })
    }
}

/// Refill a bucket after `elapsed_secs` of idleness, capped at the burst
/// capacity.
fn replenish(tokens: f64, elapsed_secs: f64, rate: f64, burst: f64) -> f64 {
    (tokens + elapsed_secs * rate).min(burst)
}

fn unix_nanos() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}

/// Rate-limiting middleware. Keys on the validated API key when present,
/// otherwise the client IP.
pub async fn rate_limit_middleware(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(request).await;
    };
    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let key = match request.extensions().get::<ApiKey>() {
        Some(api_key) => format!("apikey:{}", api_key.id),
        None => client_ip(request.headers(), addr),
    };

    let decision = match limiter
        .allow_with_burst(&key, state.config.rate_limit.burst_size)
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(error = %e, "Rate limit check failed");
            return ApiError::internal("Rate limiter unavailable").into_response();
        }
    };

    let reset_at = SystemTime::now() + decision.reset_after;
    let reset_unix = reset_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if !decision.allowed {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();

        let mut response = ApiError::too_many_requests(
            "Too many requests, please try again later",
        )
        .into_response();
        let headers = response.headers_mut();
        insert_rate_limit_headers(headers, decision.remaining, reset_unix);
        headers.insert(
            "Retry-After",
            header_value(decision.reset_after.as_secs().max(1).to_string()),
        );
        return response;
    }

    let mut response = next.run(request).await;
    insert_rate_limit_headers(response.headers_mut(), decision.remaining, reset_unix);
    response
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, remaining: u32, reset_unix: u64) {
    headers.insert("X-RateLimit-Remaining", header_value(remaining.to_string()));
    headers.insert("X-RateLimit-Reset", header_value(reset_unix.to_string()));
}

fn header_value(s: String) -> HeaderValue {
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Client identity for unauthenticated rate limiting: first
/// `X-Forwarded-For` entry, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, remote: SocketAddr) -> String {
    if let Some(xff) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(xri) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        if !xri.is_empty() {
            return xri.to_string();
        }
    }

    remote.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replenish_caps_at_burst() {
        assert_eq!(replenish(10.0, 100.0, 1.0, 10.0), 10.0);
        assert_eq!(replenish(0.0, 5.0, 1.0, 10.0), 5.0);
        assert_eq!(replenish(3.0, 0.0, 1.0, 10.0), 3.0);
    }

    #[test]
    fn replenish_matches_rate() {
        // 60 requests per 60s window = 1 token/sec.
        let tokens = replenish(0.0, 2.5, 1.0, 10.0);
        assert!((tokens - 2.5).abs() < 1e-9);
    }

    #[test]
    fn replenish_after_idle_interval() {
        // Idle T seconds ⇒ old + T × rate, within float rounding.
        let rate = 60.0 / 60.0;
        let tokens = replenish(4.0, 3.0, rate, 10.0);
        assert!((tokens - 7.0).abs() < 1e-9);
    }

    fn remote() -> SocketAddr {
        "192.0.2.1:54321".parse().unwrap()
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("X-Real-IP", "198.51.100.2".parse().unwrap());
        assert_eq!(client_ip(&headers, remote()), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", "198.51.100.2".parse().unwrap());
        assert_eq!(client_ip(&headers, remote()), "198.51.100.2");
    }

    #[test]
    fn client_ip_falls_back_to_socket_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), remote()), "192.0.2.1");
    }
}
