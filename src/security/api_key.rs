//! API key management and validation.
//!
//! Keys are stored in Redis under their SHA-256 hash and their id; the
//! raw key is returned exactly once at creation time and never persisted.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rand::RngCore;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::http::response::ApiError;
use crate::http::GatewayState;

/// A stored API key record (without the raw key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub key_hash: String,
    /// Requests per minute; 0 means the gateway default applies.
    #[serde(default)]
    pub rate_limit: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Request body for key creation.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Creation result; `raw_key` is only ever returned here.
#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub api_key: ApiKey,
    pub raw_key: String,
}

/// Error type for key lookups and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("invalid API key")]
    Invalid,

    #[error("API key is disabled")]
    Disabled,

    #[error("API key has expired")]
    Expired,

    #[error("API key not found")]
    NotFound,

    #[error("key store error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("failed to decode key record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Redis-backed API key store.
#[derive(Clone)]
pub struct ApiKeyManager {
    conn: MultiplexedConnection,
}

impl ApiKeyManager {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Validate a raw key by hash lookup; rejects inactive and expired
    /// keys.
    pub async fn validate_key(&self, raw_key: &str) -> Result<ApiKey, ApiKeyError> {
        let mut conn = self.conn.clone();
        let lookup = format!("apikey:hash:{}", hash_key(raw_key));

        let data: Option<String> = redis::cmd("GET")
            .arg(&lookup)
            .query_async(&mut conn)
            .await?;
        let data = data.ok_or(ApiKeyError::Invalid)?;
        let api_key: ApiKey = serde_json::from_str(&data)?;

        if !api_key.active {
            return Err(ApiKeyError::Disabled);
        }
        if let Some(expires_at) = api_key.expires_at {
            if Utc::now() > expires_at {
                return Err(ApiKeyError::Expired);
            }
        }

        Ok(api_key)
    }

    /// Create a new key; the raw key is returned once and only its hash
    /// is stored.
    pub async fn create_key(&self, req: &CreateKeyRequest) -> Result<CreateKeyResponse, ApiKeyError> {
        let raw_key = random_hex(32);
        let key_hash = hash_key(&raw_key);
        let id = random_hex(8);

        let api_key = ApiKey {
            id: id.clone(),
            name: req.name.clone(),
            key_hash: key_hash.clone(),
            rate_limit: req.rate_limit,
            created_at: Utc::now(),
            expires_at: req.expires_at,
            active: true,
        };

        let data = serde_json::to_string(&api_key)?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .set(format!("apikey:hash:{key_hash}"), &data)
            .ignore()
            .set(format!("apikey:id:{id}"), &data)
            .ignore()
            .sadd("apikey:list", &id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(CreateKeyResponse { api_key, raw_key })
    }

    /// Fetch a key record by id.
    pub async fn get_key(&self, id: &str) -> Result<ApiKey, ApiKeyError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = redis::cmd("GET")
            .arg(format!("apikey:id:{id}"))
            .query_async(&mut conn)
            .await?;
        let data = data.ok_or(ApiKeyError::NotFound)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// List every key with hashes blanked.
    pub async fn list_keys(&self) -> Result<Vec<ApiKey>, ApiKeyError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg("apikey:list")
            .query_async(&mut conn)
            .await?;

        let mut keys = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(mut key) = self.get_key(&id).await {
                key.key_hash.clear();
                keys.push(key);
            }
        }
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(keys)
    }

    /// Disable a key without removing it.
    pub async fn revoke_key(&self, id: &str) -> Result<(), ApiKeyError> {
        let mut api_key = self.get_key(id).await?;
        api_key.active = false;

        let data = serde_json::to_string(&api_key)?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .set(format!("apikey:hash:{}", api_key.key_hash), &data)
            .ignore()
            .set(format!("apikey:id:{id}"), &data)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Permanently remove a key.
    pub async fn delete_key(&self, id: &str) -> Result<(), ApiKeyError> {
        let api_key = self.get_key(id).await?;

        let mut conn = self.conn.clone();
        redis::pipe()
            .del(format!("apikey:hash:{}", api_key.key_hash))
            .ignore()
            .del(format!("apikey:id:{id}"))
            .ignore()
            .srem("apikey:list", id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// SHA-256 hex digest of a raw key.
pub fn hash_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// API key validation middleware. Keys arrive via `X-API-Key` or
/// `Authorization: Bearer`; requests without a key pass through
/// unauthenticated (the rate limiter then keys on the client IP).
pub async fn api_key_middleware(
    State(state): State<Arc<GatewayState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let raw_key = extract_raw_key(&request);

    let Some(raw_key) = raw_key else {
        return next.run(request).await;
    };

    let Some(manager) = &state.api_keys else {
        // No key store attached; leave the request unauthenticated.
        return next.run(request).await;
    };

    match manager.validate_key(&raw_key).await {
        Ok(api_key) => {
            request.extensions_mut().insert(api_key);
            next.run(request).await
        }
        Err(e @ (ApiKeyError::Invalid | ApiKeyError::Disabled | ApiKeyError::Expired)) => {
            ApiError::unauthorized(e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "API key validation failed");
            ApiError::internal("Key store unavailable").into_response()
        }
    }
}

fn extract_raw_key(request: &Request<Body>) -> Option<String> {
    if let Some(key) = request.headers().get("X-API-Key").and_then(|v| v.to_str().ok()) {
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }

    request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        let hash = hash_key("test-key");
        assert_eq!(hash.len(), 64);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
        // Stable digest for a known input.
        assert_eq!(hash, hash_key("test-key"));
        assert_ne!(hash, hash_key("other-key"));
    }

    #[test]
    fn random_hex_length_and_uniqueness() {
        let a = random_hex(32);
        let b = random_hex(32);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn key_record_roundtrip() {
        let api_key = ApiKey {
            id: "abc123".into(),
            name: "ci".into(),
            key_hash: hash_key("raw"),
            rate_limit: 0,
            created_at: Utc::now(),
            expires_at: None,
            active: true,
        };
        let json = serde_json::to_string(&api_key).unwrap();
        let back: ApiKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "abc123");
        assert!(back.active);
        assert!(back.expires_at.is_none());
    }

    #[test]
    fn extract_key_from_either_header() {
        let req = Request::builder()
            .header("X-API-Key", "raw-1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_raw_key(&req).as_deref(), Some("raw-1"));

        let req = Request::builder()
            .header("Authorization", "Bearer raw-2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_raw_key(&req).as_deref(), Some("raw-2"));

        let req = Request::builder()
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert!(extract_raw_key(&req).is_none());
    }
}
