//! Registry of per-service circuit breakers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerStats, CircuitBreaker};

/// Lazily creates and hands out one breaker per service name.
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Return the breaker for `name`, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().expect("registry lock poisoned");
            if let Some(cb) = breakers.get(name) {
                return cb.clone();
            }
        }

        let mut breakers = self.breakers.write().expect("registry lock poisoned");
        // Double-check after acquiring the write lock.
        if let Some(cb) = breakers.get(name) {
            return cb.clone();
        }

        let cb = Arc::new(CircuitBreaker::new(name, self.config));
        breakers.insert(name.to_string(), cb.clone());
        cb
    }

    /// Snapshots of every breaker.
    pub fn all_stats(&self) -> Vec<BreakerStats> {
        let breakers = self.breakers.read().expect("registry lock poisoned");
        breakers.values().map(|cb| cb.snapshot()).collect()
    }

    /// Reset one breaker; false when the name is unknown.
    pub fn reset_by_name(&self, name: &str) -> bool {
        let breakers = self.breakers.read().expect("registry lock poisoned");
        match breakers.get(name) {
            Some(cb) => {
                cb.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker to closed.
    pub fn reset_all(&self) {
        let breakers = self.breakers.read().expect("registry lock poisoned");
        for cb in breakers.values() {
            cb.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::BreakerState;

    #[test]
    fn get_or_create_returns_same_instance() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("auth-service");
        let b = registry.get_or_create("auth-service");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_services_get_distinct_breakers() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("auth-service");
        let b = registry.get_or_create("user-service");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.all_stats().len(), 2);
    }

    #[test]
    fn reset_by_name() {
        let config = CircuitBreakerConfig {
            max_failures: 1,
            ..Default::default()
        };
        let registry = BreakerRegistry::new(config);
        let cb = registry.get_or_create("svc");
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        assert!(registry.reset_by_name("svc"));
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(!registry.reset_by_name("missing"));
    }

    #[test]
    fn reset_all() {
        let config = CircuitBreakerConfig {
            max_failures: 1,
            ..Default::default()
        };
        let registry = BreakerRegistry::new(config);
        let a = registry.get_or_create("a");
        let b = registry.get_or_create("b");
        a.record_failure();
        b.record_failure();

        registry.reset_all();
        assert_eq!(a.state(), BreakerState::Closed);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn concurrent_get_or_create_single_breaker() {
        let registry = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry.get_or_create("svc");
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.all_stats().len(), 1);
    }
}
