//! The metrics snapshot rules evaluate against.

use async_trait::async_trait;
use serde::Serialize;

/// One consistent view of the runtime, taken per evaluation tick.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub server_healthy: bool,
    pub p95_response_ms: f64,
    pub error_rate: f64,
    pub requests_per_second: f64,
    pub memory_rss_mb: f64,
    pub cache_hit_rate: f64,
    pub cache_total_ops: u64,
    pub cache_local_healthy: bool,
    pub cache_remote_enabled: bool,
    pub cache_remote_connected: bool,
    pub cache_remote_healthy: bool,
    pub adapters_total: usize,
    pub adapters_healthy: usize,
}

impl MetricsSnapshot {
    /// Share of healthy adapters, in percent. 100 when none are registered.
    pub fn adapters_healthy_pct(&self) -> f64 {
        if self.adapters_total == 0 {
            100.0
        } else {
            self.adapters_healthy as f64 * 100.0 / self.adapters_total as f64
        }
    }
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        MetricsSnapshot {
            server_healthy: true,
            p95_response_ms: 0.0,
            error_rate: 0.0,
            requests_per_second: 0.0,
            memory_rss_mb: 0.0,
            cache_hit_rate: 1.0,
            cache_total_ops: 0,
            cache_local_healthy: true,
            cache_remote_enabled: false,
            cache_remote_connected: false,
            cache_remote_healthy: false,
            adapters_total: 0,
            adapters_healthy: 0,
        }
    }
}

/// Supplies the per-tick snapshot. Implemented by the server, which composes
/// the performance monitor, the cache service and the adapter registry.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Assembles a fresh snapshot.
    async fn snapshot(&self) -> MetricsSnapshot;
}
