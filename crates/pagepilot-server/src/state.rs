//! Process-wide application state and its composition.

use crate::config::AppConfig;
use crate::dispatch::ToolDispatcher;
use async_trait::async_trait;
use pagepilot_adapters::{AdapterError, AdapterRegistry, FileSystemAdapter, SourceAdapter};
use pagepilot_breaker::BreakerRegistry;
use pagepilot_cache::{CacheService, InMemoryConnector, RemoteConnector};
use pagepilot_monitoring::{
    ConsoleSink, MetricsSnapshot, MetricsSource, MonitoringConfig, MonitoringService,
};
use pagepilot_perf::{PerfConfig, PerformanceMonitor};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared handles for every subsystem. Cloning is cheap; all fields are
/// process-wide singletons behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<CacheService>,
    pub perf: Arc<PerformanceMonitor>,
    pub monitoring: Arc<MonitoringService>,
    pub breakers: Arc<BreakerRegistry>,
    pub adapters: Arc<AdapterRegistry>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub healthy: Arc<AtomicBool>,
    pub started_at: Instant,
}

impl AppState {
    /// Builds the full state, creating every configured source adapter. The
    /// in-memory remote connector backs the remote tier when one is enabled;
    /// a networked deployment swaps in its own [`RemoteConnector`].
    pub async fn build(config: AppConfig) -> Result<AppState, AdapterError> {
        let connector: Option<Arc<dyn RemoteConnector>> = config
            .cache
            .remote
            .enabled
            .then(|| Arc::new(InMemoryConnector::new()) as Arc<dyn RemoteConnector>);
        Self::build_with_connector(config, connector).await
    }

    /// Builds the state with an explicit remote connector (or none).
    pub async fn build_with_connector(
        config: AppConfig,
        connector: Option<Arc<dyn RemoteConnector>>,
    ) -> Result<AppState, AdapterError> {
        let breakers = Arc::new(BreakerRegistry::new());
        let cache = Arc::new(CacheService::new(
            config.cache.clone(),
            &breakers,
            connector,
        ));

        let perf = Arc::new(PerformanceMonitor::new(PerfConfig {
            max_samples: config.performance.max_samples,
            window_seconds: config.performance.window_seconds,
        }));

        let monitoring = Arc::new(MonitoringService::new(MonitoringConfig {
            enabled: config.monitoring.enabled,
            check_interval: Duration::from_millis(config.monitoring.check_interval_ms.max(1)),
            max_active_alerts: config.monitoring.max_active_alerts,
            alert_retention_hours: config.monitoring.alert_retention_hours,
        }));
        monitoring.add_sink(Arc::new(ConsoleSink));

        let adapters = Arc::new(AdapterRegistry::new());
        adapters.register_factory(
            "filesystem",
            Arc::new(|source_config| {
                Ok(Arc::new(FileSystemAdapter::new(source_config)) as Arc<dyn SourceAdapter>)
            }),
        );
        for source in &config.sources {
            adapters.create(source.clone()).await?;
        }

        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::clone(&adapters),
            Arc::clone(&breakers),
            Arc::clone(&perf),
        ));

        Ok(AppState {
            config: Arc::new(config),
            cache,
            perf,
            monitoring,
            breakers,
            adapters,
            dispatcher,
            healthy: Arc::new(AtomicBool::new(true)),
            started_at: Instant::now(),
        })
    }

    /// Starts the background loops: remote-cache connection, local-tier
    /// sweeper, monitoring ticks and (when configured) the realtime loop.
    pub async fn start_background(&self) {
        self.cache.connect_remote().await;
        Arc::clone(&self.cache).start_sweeper();
        Arc::clone(&self.monitoring).start(self.metrics_source());
        if let Some(secs) = self.config.performance.realtime_interval_seconds {
            Arc::clone(&self.perf).start_realtime(Duration::from_secs(secs.max(1)));
        }
    }

    /// Graceful teardown: monitoring and realtime timers stop, adapters are
    /// cleaned up, the remote cache disconnects.
    pub async fn shutdown(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        self.monitoring.stop();
        self.perf.stop_realtime();
        self.adapters.cleanup().await;
        self.cache.shutdown().await;
    }

    /// The metrics source the monitoring loop evaluates.
    pub fn metrics_source(&self) -> Arc<dyn MetricsSource> {
        Arc::new(SnapshotSource {
            state: self.clone(),
        })
    }

    /// Composed health: `(overall, components)`.
    pub async fn overall_health(&self) -> (bool, Value) {
        let cache = self.cache.health().await;
        let sources = self.adapters.health_check_all().await;
        let breakers = self.breakers.health_summary();
        let summary = self.perf.global_summary();

        let sources_total = sources.len();
        let sources_healthy = sources.iter().filter(|s| s.healthy).count();
        let sources_ok = sources_total == 0 || sources_healthy * 2 >= sources_total;

        let overall =
            self.healthy.load(Ordering::SeqCst) && cache.overall_healthy && sources_ok;

        let components = json!({
            "server": {
                "healthy": self.healthy.load(Ordering::SeqCst),
                "uptime_seconds": self.started_at.elapsed().as_secs(),
            },
            "cache": cache,
            "sources": {
                "healthy": sources_healthy,
                "total": sources_total,
                "adapters": sources,
            },
            "circuit_breakers": breakers,
            "performance": summary,
        });
        (overall, components)
    }
}

struct SnapshotSource {
    state: AppState,
}

#[async_trait]
impl MetricsSource for SnapshotSource {
    async fn snapshot(&self) -> MetricsSnapshot {
        let state = &self.state;
        let summary = state.perf.global_summary();
        let resources = state.perf.resource_usage();
        let cache_stats = state.cache.stats();
        let cache_health = state.cache.health().await;
        let sources = state.adapters.health_check_all().await;

        MetricsSnapshot {
            server_healthy: state.healthy.load(Ordering::SeqCst),
            p95_response_ms: summary.p95_ms,
            error_rate: summary.error_rate,
            requests_per_second: summary.throughput_rps,
            memory_rss_mb: resources.rss_bytes as f64 / (1024.0 * 1024.0),
            cache_hit_rate: cache_stats.hit_rate,
            cache_total_ops: cache_stats.total_operations,
            cache_local_healthy: cache_health.memory_cache.healthy,
            cache_remote_enabled: cache_health.redis_cache.enabled,
            cache_remote_connected: cache_health.redis_cache.connected,
            cache_remote_healthy: cache_health.redis_cache.healthy,
            adapters_total: sources.len(),
            adapters_healthy: sources.iter().filter(|s| s.healthy).count(),
        }
    }
}
