//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → service's LoadBalancer
//!     → strategy (round_robin.rs | random.rs) picks a healthy Backend
//!     → health checker callbacks flip per-backend healthy flags
//! ```
//!
//! # Design Decisions
//! - Strategies share the `Selector` trait; dispatch is dynamic
//! - Health flags are atomics; a select racing a concurrent set_healthy
//!   may route one extra request to a dying backend, which surfaces as a
//!   5xx and is retried elsewhere
//! - Unhealthy backends are excluded from selection

pub mod backend;
pub mod random;
pub mod round_robin;

use axum::http::Uri;
use std::sync::Arc;

use crate::config::{BackendSpec, Strategy};
pub use backend::Backend;
pub use random::Random;
pub use round_robin::RoundRobin;

/// A backend selection strategy.
pub trait Selector: Send + Sync {
    /// Next healthy backend, or None when none are available.
    fn select(&self) -> Option<Arc<Backend>>;
    /// Update the health flag of the backend with the given URL.
    fn set_healthy(&self, url: &str, healthy: bool);
    /// All backends, healthy or not.
    fn backends(&self) -> &[Arc<Backend>];
}

/// Health-aware backend selection for one service.
#[derive(Clone)]
pub struct LoadBalancer {
    selector: Arc<dyn Selector>,
}

impl LoadBalancer {
    /// Build a balancer from backend specs. Specs with unparsable URLs
    /// must have been rejected by config validation.
    pub fn new(strategy: Strategy, specs: &[BackendSpec]) -> Result<Self, axum::http::uri::InvalidUri> {
        let mut backends = Vec::with_capacity(specs.len());
        for spec in specs {
            let uri: Uri = spec.url.parse()?;
            backends.push(Arc::new(Backend::new(uri, spec.weight)));
        }

        let selector: Arc<dyn Selector> = match strategy {
            Strategy::Random => Arc::new(Random::new(backends)),
            Strategy::RoundRobin => Arc::new(RoundRobin::new(backends)),
        };

        Ok(Self { selector })
    }

    pub fn select(&self) -> Option<Arc<Backend>> {
        self.selector.select()
    }

    pub fn set_healthy(&self, url: &str, healthy: bool) {
        self.selector.set_healthy(url, healthy);
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        self.selector.backends()
    }

    pub fn healthy_count(&self) -> usize {
        self.selector
            .backends()
            .iter()
            .filter(|b| b.is_healthy())
            .count()
    }
}
