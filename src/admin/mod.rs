//! Administrative surface: API key lifecycle and circuit breaker
//! management, protected by Basic auth when enabled.

pub mod auth;
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::http::GatewayState;
pub use auth::{admin_auth_middleware, AdminCredentials};

/// Admin routes; auth is enforced by the path-scoped middleware in the
/// outer stack.
pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route(
            "/admin/apikeys",
            post(handlers::create_api_key).get(handlers::list_api_keys),
        )
        .route("/admin/apikeys/{id}/revoke", post(handlers::revoke_api_key))
        .route("/admin/apikeys/{id}", delete(handlers::delete_api_key))
        .route("/admin/circuit-breakers", get(handlers::get_circuit_breakers))
        .route(
            "/admin/circuit-breakers/{name}/reset",
            post(handlers::reset_circuit_breaker),
        )
        .route(
            "/admin/circuit-breakers/reset",
            post(handlers::reset_all_circuit_breakers),
        )
}
