//! Backend abstraction.

use axum::http::Uri;
use std::sync::atomic::{AtomicBool, Ordering};

/// A single backend instance of a service.
///
/// The healthy flag is owned by the service's load balancer and mutated
/// only through `LoadBalancer::set_healthy`, which the health checker
/// drives via its change callbacks.
#[derive(Debug)]
pub struct Backend {
    /// Parsed absolute URL.
    pub uri: Uri,
    /// Canonical URL string, the identity used by health callbacks.
    pub url: String,
    /// Host[:port] portion, used for the Host and X-Backend headers.
    pub authority: String,
    /// Relative weight (carried for future weighted strategies).
    pub weight: u32,
    healthy: AtomicBool,
}

impl Backend {
    pub fn new(uri: Uri, weight: u32) -> Self {
        let url = uri.to_string();
        // Uri::to_string appends a trailing "/" for bare authorities;
        // strip it so callback identities match the configured URL.
        let url = url.strip_suffix('/').map(str::to_string).unwrap_or(url);
        let authority = uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();

        Self {
            uri,
            url,
            authority,
            weight,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}
