//! Admin endpoint handlers: API key lifecycle and circuit breaker
//! inspection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::http::response::ApiError;
use crate::http::GatewayState;
use crate::security::api_key::{ApiKeyError, ApiKeyManager, CreateKeyRequest};

fn key_manager(state: &GatewayState) -> Result<&ApiKeyManager, ApiError> {
    state.api_keys.as_ref().ok_or_else(|| {
        ApiError::service_unavailable("API key management is not available without Redis")
    })
}

fn key_error_response(err: ApiKeyError) -> Response {
    match err {
        ApiKeyError::NotFound => ApiError::not_found("API key not found").into_response(),
        other => {
            tracing::error!(error = %other, "API key operation failed");
            ApiError::internal(other.to_string()).into_response()
        }
    }
}

pub async fn create_api_key(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<CreateKeyRequest>,
) -> Response {
    let manager = match key_manager(&state) {
        Ok(manager) => manager,
        Err(e) => return e.into_response(),
    };

    if request.name.is_empty() {
        return ApiError::bad_request("name is required").into_response();
    }

    match manager.create_key(&request).await {
        Ok(result) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "status": "success",
                "message": "API key created. Save the raw_key - it won't be shown again!",
                "data": result,
            })),
        )
            .into_response(),
        Err(e) => key_error_response(e),
    }
}

pub async fn list_api_keys(State(state): State<Arc<GatewayState>>) -> Response {
    let manager = match key_manager(&state) {
        Ok(manager) => manager,
        Err(e) => return e.into_response(),
    };

    match manager.list_keys().await {
        Ok(keys) => Json(serde_json::json!({
            "status": "success",
            "data": keys,
        }))
        .into_response(),
        Err(e) => key_error_response(e),
    }
}

pub async fn revoke_api_key(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Response {
    let manager = match key_manager(&state) {
        Ok(manager) => manager,
        Err(e) => return e.into_response(),
    };

    match manager.revoke_key(&id).await {
        Ok(()) => Json(serde_json::json!({
            "status": "success",
            "message": "API key revoked",
        }))
        .into_response(),
        Err(e) => key_error_response(e),
    }
}

pub async fn delete_api_key(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Response {
    let manager = match key_manager(&state) {
        Ok(manager) => manager,
        Err(e) => return e.into_response(),
    };

    match manager.delete_key(&id).await {
        Ok(()) => Json(serde_json::json!({
            "status": "success",
            "message": "API key deleted",
        }))
        .into_response(),
        Err(e) => key_error_response(e),
    }
}

pub async fn get_circuit_breakers(State(state): State<Arc<GatewayState>>) -> Response {
    Json(serde_json::json!({
        "status": "success",
        "data": state.proxy.breaker_stats(),
    }))
    .into_response()
}

pub async fn reset_circuit_breaker(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Response {
    if !state.proxy.reset_breaker(&name) {
        return ApiError::not_found(format!("Circuit breaker for service '{name}' not found"))
            .into_response();
    }

    Json(serde_json::json!({
        "status": "success",
        "message": format!("Circuit breaker for '{name}' has been reset"),
    }))
    .into_response()
}

pub async fn reset_all_circuit_breakers(State(state): State<Arc<GatewayState>>) -> Response {
    state.proxy.reset_all_breakers();
    Json(serde_json::json!({
        "status": "success",
        "message": "All circuit breakers have been reset",
    }))
    .into_response()
}
