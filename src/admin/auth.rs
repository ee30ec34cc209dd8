//! HTTP Basic authentication for admin endpoints.
//!
//! Credentials are compared as SHA-256 digests with a constant-time
//! comparison, so timing is independent of how much of the value matches.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::http::GatewayState;

/// Pre-hashed admin credentials.
#[derive(Clone)]
pub struct AdminCredentials {
    username_hash: [u8; 32],
    password_hash: [u8; 32],
}

impl AdminCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username_hash: Sha256::digest(username.as_bytes()).into(),
            password_hash: Sha256::digest(password.as_bytes()).into(),
        }
    }

    /// Constant-time credential check.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let username_hash: [u8; 32] = Sha256::digest(username.as_bytes()).into();
        let password_hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();

        let username_ok = self.username_hash.ct_eq(&username_hash);
        let password_ok = self.password_hash.ct_eq(&password_hash);
        bool::from(username_ok & password_ok)
    }
}

/// Protects `/admin` paths with Basic auth; everything else passes
/// through untouched.
pub async fn admin_auth_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(credentials) = &state.admin_auth else {
        return next.run(request).await;
    };
    if !request.uri().path().starts_with("/admin") {
        return next.run(request).await;
    }

    let Some(auth_header) = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return auth_failed("Authorization header required");
    };

    let Some(encoded) = auth_header.strip_prefix("Basic ") else {
        return auth_failed("Basic authentication required");
    };

    let Ok(decoded) = BASE64.decode(encoded) else {
        return auth_failed("Invalid authorization header");
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return auth_failed("Invalid authorization header");
    };

    let Some((username, password)) = decoded.split_once(':') else {
        return auth_failed("Invalid credentials format");
    };

    if !credentials.verify(username, password) {
        tracing::warn!(path = %request.uri().path(), "Admin auth failed");
        return auth_failed("Invalid credentials");
    }

    next.run(request).await
}

fn auth_failed(message: &str) -> Response {
    let body = serde_json::json!({
        "error": "Unauthorized",
        "message": message,
    });
    let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    response.headers_mut().insert(
        axum::http::header::WWW_AUTHENTICATE,
        HeaderValue::from_static(r#"Basic realm="API Gateway Admin", charset="UTF-8""#),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_exact_match() {
        let creds = AdminCredentials::new("admin", "s3cret");
        assert!(creds.verify("admin", "s3cret"));
    }

    #[test]
    fn verify_rejects_wrong_credentials() {
        let creds = AdminCredentials::new("admin", "s3cret");
        assert!(!creds.verify("admin", "wrong"));
        assert!(!creds.verify("root", "s3cret"));
        assert!(!creds.verify("", ""));
        // Prefix of the real password must not pass.
        assert!(!creds.verify("admin", "s3cre"));
    }

    #[test]
    fn challenge_response_carries_www_authenticate() {
        let response = auth_failed("Authorization header required");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let header = response
            .headers()
            .get(axum::http::header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(header.contains("API Gateway Admin"));
    }
}
