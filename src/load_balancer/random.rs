//! Random load balancing.

use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::load_balancer::backend::Backend;
use crate::load_balancer::Selector;

/// Picks uniformly among the currently healthy backends.
pub struct Random {
    backends: Vec<Arc<Backend>>,
}

impl Random {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self { backends }
    }
}

impl Selector for Random {
    fn select(&self) -> Option<Arc<Backend>> {
        let healthy: Vec<&Arc<Backend>> = self
            .backends
            .iter()
            .filter(|b| b.is_healthy())
            .collect();
        healthy.choose(&mut rand::thread_rng()).map(|b| (*b).clone())
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn make(urls: &[&str]) -> Random {
        Random::new(
            urls.iter()
                .map(|u| Arc::new(Backend::new(u.parse().unwrap(), 1)))
                .collect(),
        )
    }

    #[test]
    fn empty_returns_none() {
        assert!(make(&[]).select().is_none());
    }

    #[test]
    fn single_backend_always_selected() {
        let lb = make(&["http://a:1"]);
        for _ in 0..10 {
            assert_eq!(lb.select().unwrap().url, "http://a:1");
        }
    }

    #[test]
    fn only_healthy_backends_selected() {
        let lb = make(&["http://a:1", "http://b:1", "http://c:1"]);
        lb.set_healthy("http://b:1", false);

        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(lb.select().unwrap().url.clone());
        }
        assert!(seen.contains("http://a:1"));
        assert!(seen.contains("http://c:1"));
        assert!(!seen.contains("http://b:1"));
    }

    #[test]
    fn none_when_all_unhealthy() {
        let lb = make(&["http://a:1"]);
        lb.set_healthy("http://a:1", false);
        assert!(lb.select().is_none());
    }
}
