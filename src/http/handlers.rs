//! Management endpoint handlers.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::http::response::ApiError;
use crate::http::GatewayState;
use crate::observability::metrics;

pub async fn health() -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "message": "API Gateway is running",
    }))
    .into_response()
}

pub async fn info(State(state): State<Arc<GatewayState>>) -> Response {
    let services: Vec<serde_json::Value> = state
        .proxy
        .services()
        .iter()
        .map(|svc| {
            let mut entry = serde_json::json!({
                "name": svc.name,
                "path_prefix": svc.path_prefix,
                "strategy": svc.strategy.as_str(),
            });

            if let Some((healthy, total)) = state.proxy.healthy_count(&svc.name) {
                entry["backends"] = serde_json::json!({
                    "healthy": healthy,
                    "total": total,
                });
            }

            if let Some(checker) = &state.health {
                if let Some(health) = checker.get_health(&svc.name) {
                    entry["status"] = health.status.as_str().into();
                    entry["response_time_ms"] = health.response_time_ms.into();
                }
            }

            entry
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "services": services,
    }))
    .into_response()
}

pub async fn services_health(State(state): State<Arc<GatewayState>>) -> Response {
    let Some(checker) = &state.health else {
        return ApiError::service_unavailable("Service health checking is not enabled")
            .into_response();
    };

    Json(serde_json::json!({
        "status": "ok",
        "services": checker.get_all_health(),
    }))
    .into_response()
}

/// Prometheus text by default; a JSON summary when the caller asks for
/// `application/json`.
pub async fn metrics_endpoint(headers: HeaderMap) -> Response {
    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    if wants_json {
        return Json(metrics::json_summary()).into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics::render_prometheus(),
    )
        .into_response()
}
