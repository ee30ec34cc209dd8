//! Round-robin load balancing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::load_balancer::backend::Backend;
use crate::load_balancer::Selector;

/// Rotates through backends in configuration order, skipping unhealthy
/// entries.
///
/// The counter advances exactly once per call, so distribution stays fair
/// under concurrency; unhealthy backends are skipped by scanning forward
/// from the candidate index for at most one full cycle.
pub struct RoundRobin {
    backends: Vec<Arc<Backend>>,
    counter: AtomicU64,
}

impl RoundRobin {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends,
            counter: AtomicU64::new(0),
        }
    }
}

impl Selector for RoundRobin {
    fn select(&self) -> Option<Arc<Backend>> {
        let n = self.backends.len();
        if n == 0 {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        for i in 0..n as u64 {
            let idx = ((start + i) % n as u64) as usize;
            let backend = &self.backends[idx];
            if backend.is_healthy() {
                return Some(backend.clone());
            }
        }

        None
    }

    fn set_healthy(&self, url: &str, healthy: bool) {
        for backend in &self.backends {
            if backend.url == url {
                backend.set_healthy(healthy);
                return;
            }
        }
    }

    fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }
}
