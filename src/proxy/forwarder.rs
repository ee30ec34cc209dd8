//! Per-backend request forwarding.
//!
//! A forwarder rewrites the inbound request for one backend (prefix
//! stripping, Host header, hop-by-hop removal), executes it on the shared
//! client and returns a fully buffered response so the retry loop can
//! replay or discard it. Transport failures become a synthesized 502 with
//! the standard error envelope, which the retry engine then treats like
//! any other retryable status.

use axum::body::{Body, Bytes};
use axum::http::{header::HeaderName, request, HeaderMap, HeaderValue, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use std::sync::Arc;

use crate::load_balancer::Backend;

/// Headers that must not be forwarded between hops.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A buffered backend response.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forwards requests to one backend instance.
pub struct Forwarder {
    service: String,
    backend: Arc<Backend>,
    strip_prefix: Option<String>,
    client: Client<HttpConnector, Body>,
}

impl Forwarder {
    pub fn new(
        service: String,
        backend: Arc<Backend>,
        strip_prefix: Option<String>,
        client: Client<HttpConnector, Body>,
    ) -> Self {
        Self {
            service,
            backend,
            strip_prefix,
            client,
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Forward the buffered request and buffer the backend's response.
    pub async fn forward(&self, parts: &request::Parts, body: Bytes) -> ForwardedResponse {
        let path_and_query =
            outbound_path_and_query(&parts.uri, self.strip_prefix.as_deref());

        let uri = {
            let mut builder = Uri::builder();
            if let Some(scheme) = self.backend.uri.scheme() {
                builder = builder.scheme(scheme.clone());
            }
            if let Some(authority) = self.backend.uri.authority() {
                builder = builder.authority(authority.clone());
            }
            match builder.path_and_query(path_and_query).build() {
                Ok(uri) => uri,
                Err(e) => return self.transport_error(e.to_string()),
            }
        };

        let mut builder = axum::http::Request::builder()
            .method(parts.method.clone())
            .uri(uri);
        for (name, value) in &parts.headers {
            if is_hop_by_hop(name) || name == &axum::http::header::HOST {
                continue;
            }
            builder = builder.header(name, value);
        }
        match HeaderValue::from_str(&self.backend.authority) {
            Ok(host) => builder = builder.header(axum::http::header::HOST, host),
            Err(e) => return self.transport_error(e.to_string()),
        }

        let request = match builder.body(Body::from(body)) {
            Ok(request) => request,
            Err(e) => return self.transport_error(e.to_string()),
        };

        let response = match self.client.request(request).await {
            Ok(response) => response,
            Err(e) => return self.transport_error(e.to_string()),
        };

        let (response_parts, response_body) = response.into_parts();
        let body = match response_body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return self.transport_error(e.to_string()),
        };

        let mut headers = response_parts.headers;
        for name in HOP_BY_HOP_HEADERS {
            headers.remove(*name);
        }

        ForwardedResponse {
            status: response_parts.status,
            headers,
            body,
        }
    }

    fn transport_error(&self, message: String) -> ForwardedResponse {
        tracing::warn!(
            service = %self.service,
            backend = %self.backend.url,
            error = %message,
            "Backend error"
        );

        let body = serde_json::json!({
            "error": "Service unavailable",
            "message": message,
        });
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        ForwardedResponse {
            status: StatusCode::BAD_GATEWAY,
            headers,
            body: Bytes::from(body.to_string()),
        }
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Outbound path+query after optional prefix stripping. An empty stripped
/// path normalizes to `/`; the query string is always preserved.
fn outbound_path_and_query(uri: &Uri, strip_prefix: Option<&str>) -> String {
    let path = uri.path();
    let path = match strip_prefix {
        Some(prefix) => {
            let stripped = path.strip_prefix(prefix).unwrap_or(path);
            if stripped.is_empty() {
                "/"
            } else {
                stripped
            }
        }
        None => path,
    };

    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}
