//! Named breaker singletons, one per external dependency.

use crate::breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
use crate::config::BreakerConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Health rollup across all registered breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryHealthSummary {
    /// Breakers with a closed circuit.
    pub healthy: usize,
    /// Breakers currently probing in half-open.
    pub degraded: usize,
    /// Breakers with an open circuit.
    pub failed: usize,
    pub total: usize,
}

/// Registry of named circuit breakers.
///
/// Each dependency class gets defaults tuned for how that class fails:
/// external services are slow and flaky, caches should fail fast, databases
/// sit in between. Asking twice for the same name returns the same breaker.
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Breaker for an external source adapter or HTTP dependency.
    ///
    /// Defaults: 5 failures / 60s window, 5min recovery, 3 half-open
    /// successes, 30s call timeout.
    pub fn external_service(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(&format!("external:{name}"), || {
            BreakerConfig::builder()
                .failure_threshold(5)
                .monitoring_window(Duration::from_secs(60))
                .recovery_timeout(Duration::from_secs(300))
                .success_threshold(3)
                .call_timeout(Duration::from_secs(30))
        })
    }

    /// Breaker for a cache tier. Tuned to fail fast and recover quickly.
    ///
    /// Defaults: 3 failures / 30s window, 2min recovery, 2 half-open
    /// successes, 5s call timeout.
    pub fn cache(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(&format!("cache:{name}"), || {
            BreakerConfig::builder()
                .failure_threshold(3)
                .monitoring_window(Duration::from_secs(30))
                .recovery_timeout(Duration::from_secs(120))
                .success_threshold(2)
                .call_timeout(Duration::from_secs(5))
        })
    }

    /// Breaker for a database dependency.
    ///
    /// Defaults: 3 failures / 60s window, 5min recovery, 2 half-open
    /// successes, 10s call timeout.
    pub fn database(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create(&format!("database:{name}"), || {
            BreakerConfig::builder()
                .failure_threshold(3)
                .monitoring_window(Duration::from_secs(60))
                .recovery_timeout(Duration::from_secs(300))
                .success_threshold(2)
                .call_timeout(Duration::from_secs(10))
        })
    }

    /// Looks up a breaker by its fully-qualified name.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .lock()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Resets the named breaker to closed. Returns false when unknown.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Snapshots of every registered breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snaps: Vec<BreakerSnapshot> = self
            .breakers
            .lock()
            .expect("registry lock poisoned")
            .values()
            .map(|b| b.snapshot())
            .collect();
        snaps.sort_by(|a, b| a.name.cmp(&b.name));
        snaps
    }

    /// Health rollup: closed = healthy, half-open = degraded, open = failed.
    pub fn health_summary(&self) -> RegistryHealthSummary {
        let breakers = self.breakers.lock().expect("registry lock poisoned");
        let mut summary = RegistryHealthSummary {
            healthy: 0,
            degraded: 0,
            failed: 0,
            total: breakers.len(),
        };
        for breaker in breakers.values() {
            match breaker.state() {
                CircuitState::Closed => summary.healthy += 1,
                CircuitState::HalfOpen => summary.degraded += 1,
                CircuitState::Open => summary.failed += 1,
            }
        }
        summary
    }

    fn get_or_create(
        &self,
        key: &str,
        defaults: impl FnOnce() -> crate::config::BreakerConfigBuilder,
    ) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("registry lock poisoned");
        Arc::clone(breakers.entry(key.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(defaults().name(key.to_string()).build()))
        }))
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_returns_same_breaker() {
        let registry = BreakerRegistry::new();
        let a = registry.external_service("github");
        let b = registry.external_service("github");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn classes_get_distinct_namespaces() {
        let registry = BreakerRegistry::new();
        let external = registry.external_service("store");
        let cache = registry.cache("store");
        assert!(!Arc::ptr_eq(&external, &cache));
        assert_eq!(registry.health_summary().total, 2);
    }

    #[tokio::test]
    async fn health_summary_tracks_states() {
        let registry = BreakerRegistry::new();
        let _healthy = registry.external_service("ok");
        let failing = registry.cache("remote");

        for _ in 0..3 {
            let _ = failing
                .execute(|| async { Err::<(), _>("down") })
                .await;
        }

        let summary = registry.health_summary();
        assert_eq!(summary.healthy, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 2);
    }

    #[tokio::test]
    async fn reset_by_name() {
        let registry = BreakerRegistry::new();
        let breaker = registry.cache("remote");
        for _ in 0..3 {
            let _ = breaker
                .execute(|| async { Err::<(), _>("down") })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(registry.reset("cache:remote"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!registry.reset("cache:nope"));
    }
}
