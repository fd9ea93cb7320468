//! Factory-keyed adapter registry.

use crate::adapter::{AdapterError, AdapterHealth, AdapterMetadata, SourceAdapter, SourceConfig};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Builds an adapter from its configuration.
pub type AdapterFactory =
    Arc<dyn Fn(SourceConfig) -> Result<Arc<dyn SourceAdapter>, AdapterError> + Send + Sync>;

/// Creates, tracks and tears down source adapters.
///
/// Factories are keyed by `adapter_type`; instances by their configured name.
/// Health checks and cleanup fan out in parallel with per-adapter timeouts so
/// one wedged source cannot stall the rest.
pub struct AdapterRegistry {
    factories: Mutex<HashMap<String, AdapterFactory>>,
    adapters: Mutex<HashMap<String, Arc<dyn SourceAdapter>>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        AdapterRegistry {
            factories: Mutex::new(HashMap::new()),
            adapters: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the factory for one `adapter_type`.
    pub fn register_factory(&self, adapter_type: impl Into<String>, factory: AdapterFactory) {
        self.factories
            .lock()
            .expect("factories poisoned")
            .insert(adapter_type.into(), factory);
    }

    /// Creates an adapter from `config`, initializes it and enrolls it.
    pub async fn create(&self, config: SourceConfig) -> Result<Arc<dyn SourceAdapter>, AdapterError> {
        let factory = self
            .factories
            .lock()
            .expect("factories poisoned")
            .get(&config.adapter_type)
            .cloned()
            .ok_or_else(|| {
                AdapterError::Unsupported(format!("no factory for '{}'", config.adapter_type))
            })?;

        let name = config.name.clone();
        let adapter = factory(config)?;
        adapter.initialize().await?;
        self.adapters
            .lock()
            .expect("adapters poisoned")
            .insert(name.clone(), Arc::clone(&adapter));
        tracing::info!(adapter = %name, "source adapter initialized");
        Ok(adapter)
    }

    /// Looks up an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters
            .lock()
            .expect("adapters poisoned")
            .get(name)
            .cloned()
    }

    /// Every enrolled adapter, sorted by name.
    pub fn all(&self) -> Vec<Arc<dyn SourceAdapter>> {
        let adapters = self.adapters.lock().expect("adapters poisoned");
        let mut list: Vec<(String, Arc<dyn SourceAdapter>)> = adapters
            .iter()
            .map(|(name, adapter)| (name.clone(), Arc::clone(adapter)))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list.into_iter().map(|(_, adapter)| adapter).collect()
    }

    /// Number of enrolled adapters.
    pub fn len(&self) -> usize {
        self.adapters.lock().expect("adapters poisoned").len()
    }

    /// True when no adapters are enrolled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every adapter's health check in parallel, each under its own
    /// timeout. A check that times out reports unhealthy instead of wedging
    /// the sweep.
    pub async fn health_check_all(&self) -> Vec<AdapterHealth> {
        let adapters = self.all();
        let checks = adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move {
                let timeout = Duration::from_millis(adapter.config().timeout_ms.max(1));
                match tokio::time::timeout(timeout, adapter.health_check()).await {
                    Ok(health) => health,
                    Err(_) => AdapterHealth {
                        name: adapter.name().to_string(),
                        healthy: false,
                        response_time_ms: timeout.as_millis() as u64,
                        error: Some("health check timed out".to_string()),
                    },
                }
            }
        });
        join_all(checks).await
    }

    /// Metadata for every adapter, in name order.
    pub async fn metadata_all(&self) -> Vec<AdapterMetadata> {
        join_all(self.all().iter().map(|adapter| adapter.metadata())).await
    }

    /// Tears every adapter down in parallel, tolerating individual failures,
    /// then clears the registry.
    pub async fn cleanup(&self) {
        let adapters = self.all();
        let results = join_all(adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move { (adapter.name().to_string(), adapter.cleanup().await) }
        }))
        .await;
        for (name, result) in results {
            if let Err(error) = result {
                tracing::warn!(adapter = %name, %error, "adapter cleanup failed");
            }
        }
        self.adapters.lock().expect("adapters poisoned").clear();
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterContent, RunbookMatch, SearchResult};
    use async_trait::async_trait;
    use pagepilot_core::Severity;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubAdapter {
        config: SourceConfig,
        initialized: AtomicBool,
        slow_health: bool,
        fail_cleanup: bool,
    }

    impl StubAdapter {
        fn new(name: &str, slow_health: bool, fail_cleanup: bool) -> Arc<Self> {
            Arc::new(StubAdapter {
                config: SourceConfig {
                    name: name.to_string(),
                    adapter_type: "stub".to_string(),
                    path: None,
                    timeout_ms: 50,
                    refresh_interval_seconds: None,
                },
                initialized: AtomicBool::new(false),
                slow_health,
                fail_cleanup,
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn name(&self) -> &str {
            &self.config.name
        }

        fn config(&self) -> &SourceConfig {
            &self.config
        }

        async fn initialize(&self) -> Result<(), AdapterError> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn search(
            &self,
            _query: &str,
            _filters: Option<&serde_json::Value>,
        ) -> Result<Vec<SearchResult>, AdapterError> {
            Ok(Vec::new())
        }

        async fn search_runbooks(
            &self,
            _alert_type: &str,
            _severity: Severity,
            _systems: &[String],
        ) -> Result<Vec<RunbookMatch>, AdapterError> {
            Ok(Vec::new())
        }

        async fn get_document(&self, _id: &str) -> Result<Option<AdapterContent>, AdapterError> {
            Ok(None)
        }

        async fn health_check(&self) -> AdapterHealth {
            if self.slow_health {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            AdapterHealth {
                name: self.name().to_string(),
                healthy: true,
                response_time_ms: 1,
                error: None,
            }
        }

        async fn metadata(&self) -> AdapterMetadata {
            AdapterMetadata {
                name: self.name().to_string(),
                adapter_type: "stub".to_string(),
                document_count: 0,
                ready: self.initialized.load(Ordering::SeqCst),
                last_indexed: None,
            }
        }

        async fn refresh_index(&self, _force: bool) -> Result<usize, AdapterError> {
            Ok(0)
        }

        async fn cleanup(&self) -> Result<(), AdapterError> {
            if self.fail_cleanup {
                Err(AdapterError::Io("teardown failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn stub_factory(slow_health: bool, fail_cleanup: bool) -> AdapterFactory {
        Arc::new(move |config: SourceConfig| {
            let adapter = StubAdapter::new(&config.name, slow_health, fail_cleanup);
            Ok(adapter as Arc<dyn SourceAdapter>)
        })
    }

    fn stub_config(name: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            adapter_type: "stub".to_string(),
            path: None,
            timeout_ms: 50,
            refresh_interval_seconds: None,
        }
    }

    #[tokio::test]
    async fn create_initializes_and_enrolls() {
        let registry = AdapterRegistry::new();
        registry.register_factory("stub", stub_factory(false, false));

        let adapter = registry.create(stub_config("docs")).await.unwrap();
        assert_eq!(adapter.name(), "docs");
        assert_eq!(registry.len(), 1);
        assert!(registry.get("docs").is_some());
        assert!(adapter.metadata().await.ready);
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let registry = AdapterRegistry::new();
        let err = match registry.create(stub_config("docs")).await {
            Err(err) => err,
            Ok(_) => panic!("expected a missing-factory error"),
        };
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }

    #[tokio::test]
    async fn slow_health_check_times_out_individually() {
        let registry = AdapterRegistry::new();
        registry.register_factory("stub", stub_factory(true, false));
        registry.create(stub_config("wedged")).await.unwrap();

        let reports = registry.health_check_all().await;
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].healthy);
        assert!(reports[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cleanup_tolerates_failures_and_clears() {
        let registry = AdapterRegistry::new();
        registry.register_factory("stub", stub_factory(false, true));
        registry.create(stub_config("flaky")).await.unwrap();

        registry.cleanup().await;
        assert!(registry.is_empty());
    }
}
