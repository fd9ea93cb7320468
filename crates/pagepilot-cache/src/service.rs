//! The two-tier cache service.

use crate::config::{CacheConfig, CacheStrategy};
use crate::connection::ConnectionManager;
use crate::entry::CacheEntry;
use crate::fingerprint::Fingerprint;
use crate::memory::MemoryTier;
use crate::remote::{RemoteCacheError, RemoteConnector};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use pagepilot_breaker::{BreakerRegistry, CircuitBreaker};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Health report for both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealthReport {
    pub overall_healthy: bool,
    pub memory_cache: MemoryTierHealth,
    pub redis_cache: RemoteTierHealth,
}

/// Local-tier health.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryTierHealth {
    pub healthy: bool,
    pub latency_ms: u64,
    pub keys: usize,
    pub max_keys: usize,
}

/// Remote-tier health.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteTierHealth {
    pub enabled: bool,
    pub healthy: bool,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Two-tier cache with strategy-driven reads and writes.
///
/// The local tier is the single writer for local entries; the optional remote
/// tier sits behind the connection manager and the registry's cache-class
/// circuit breaker, so remote outages degrade to local-only service instead
/// of failing requests.
pub struct CacheService {
    config: CacheConfig,
    memory: MemoryTier,
    remote: Option<Arc<ConnectionManager>>,
    breaker: Arc<CircuitBreaker>,
    stats: CacheStats,
}

impl CacheService {
    /// Builds the service. A connector is required only when the remote tier
    /// is enabled and the strategy involves it.
    pub fn new(
        config: CacheConfig,
        registry: &BreakerRegistry,
        connector: Option<Arc<dyn RemoteConnector>>,
    ) -> Self {
        let remote_wanted =
            config.remote.enabled && config.strategy != CacheStrategy::MemoryOnly;
        let remote = match (remote_wanted, connector) {
            (true, Some(connector)) => {
                Some(ConnectionManager::new(config.remote.clone(), connector))
            }
            (true, None) => {
                tracing::warn!(
                    "remote cache enabled but no connector supplied; running local-only"
                );
                None
            }
            _ => None,
        };

        CacheService {
            memory: MemoryTier::new(config.memory.max_keys, config.memory.ttl_seconds),
            breaker: registry.cache("remote-cache"),
            remote,
            stats: CacheStats::new(),
            config,
        }
    }

    /// The active strategy.
    pub fn strategy(&self) -> CacheStrategy {
        self.config.strategy
    }

    /// True when caching is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The connection manager, when a remote tier is configured.
    pub fn remote_manager(&self) -> Option<&Arc<ConnectionManager>> {
        self.remote.as_ref()
    }

    /// Establishes the remote connection eagerly (startup path).
    pub async fn connect_remote(&self) {
        if let Some(manager) = &self.remote {
            manager.connect().await;
        }
    }

    /// Looks up `fingerprint`.
    ///
    /// Probes the local tier first, then the remote tier (per strategy),
    /// promoting remote hits into the local tier with the current
    /// content-type TTL. Errors are counted as misses and never propagate.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<serde_json::Value> {
        if !self.config.enabled {
            return None;
        }

        let content_type = fingerprint.content_type;
        let local_key = fingerprint.local_key();

        if self.config.strategy != CacheStrategy::RemoteOnly {
            if let Some(entry) = self.memory.get(&local_key) {
                self.stats.record_hit(content_type);
                return Some(entry.payload);
            }
        }

        if self.config.strategy != CacheStrategy::MemoryOnly {
            if let Some(entry) = self.remote_get(fingerprint).await {
                if self.config.strategy == CacheStrategy::Hybrid {
                    let promoted = CacheEntry::new(
                        entry.payload.clone(),
                        self.config.ttl_for(content_type),
                        content_type,
                    );
                    self.memory.insert(local_key, promoted);
                }
                self.stats.record_hit(content_type);
                return Some(entry.payload);
            }
        }

        self.stats.record_miss(content_type);
        None
    }

    /// Stores `payload` under `fingerprint` with the content-type TTL.
    pub async fn set(&self, fingerprint: &Fingerprint, payload: serde_json::Value) {
        let ttl = self.config.ttl_for(fingerprint.content_type);
        self.set_with_ttl(fingerprint, payload, ttl).await;
    }

    /// Stores `payload` with an explicit TTL (the pipeline's strategy-derived
    /// TTL overrides the content-type default).
    ///
    /// The local write always succeeds; a remote write failure is logged and
    /// absorbed.
    pub async fn set_with_ttl(
        &self,
        fingerprint: &Fingerprint,
        payload: serde_json::Value,
        ttl_seconds: u64,
    ) {
        if !self.config.enabled {
            return;
        }

        let entry = CacheEntry::new(payload, ttl_seconds, fingerprint.content_type);

        if self.config.strategy != CacheStrategy::RemoteOnly {
            self.memory.insert(fingerprint.local_key(), entry.clone());
        }

        if self.config.strategy != CacheStrategy::MemoryOnly {
            self.remote_set(fingerprint, &entry).await;
        }
    }

    /// Deletes one entry from both tiers. Returns true when the local tier
    /// held it.
    pub async fn delete(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.memory.remove(&fingerprint.local_key());
        if self.config.strategy != CacheStrategy::MemoryOnly {
            if let Some(manager) = &self.remote {
                let key = fingerprint.remote_key(&self.config.remote.key_prefix);
                let result = self
                    .breaker
                    .execute(|| async {
                        manager
                            .execute(|conn| async move { conn.delete(&key).await })
                            .await
                            .ok_or_else(unavailable)
                    })
                    .await;
                if let Err(error) = result {
                    tracing::debug!(%fingerprint, %error, "remote delete failed");
                }
            }
        }
        removed
    }

    /// Deletes every entry of one content type from both tiers. Returns the
    /// number removed locally. Idempotent: clearing an already-empty type is
    /// a no-op and preserves statistics.
    pub async fn clear_by_type(&self, content_type: pagepilot_core::ContentType) -> usize {
        let prefix = format!("{}:", content_type.as_str());
        let removed = self.memory.remove_prefix(&prefix);
        if self.config.strategy != CacheStrategy::MemoryOnly {
            if let Some(manager) = &self.remote {
                let remote_prefix = format!("{}{}", self.config.remote.key_prefix, prefix);
                let result = self
                    .breaker
                    .execute(|| async {
                        manager
                            .execute(|conn| async move {
                                conn.delete_prefix(&remote_prefix).await
                            })
                            .await
                            .ok_or_else(unavailable)
                    })
                    .await;
                if let Err(error) = result {
                    tracing::debug!(content_type = %content_type, %error, "remote clear-by-type failed");
                }
            }
        }
        tracing::info!(content_type = %content_type, removed, "cleared cache entries by type");
        removed
    }

    /// Drops every entry from both tiers.
    pub async fn clear_all(&self) {
        self.memory.clear();
        if self.config.strategy != CacheStrategy::MemoryOnly {
            if let Some(manager) = &self.remote {
                let prefix = self.config.remote.key_prefix.clone();
                let result = self
                    .breaker
                    .execute(|| async {
                        manager
                            .execute(|conn| async move { conn.delete_prefix(&prefix).await })
                            .await
                            .ok_or_else(unavailable)
                    })
                    .await;
                if let Err(error) = result {
                    tracing::debug!(%error, "remote clear-all failed");
                }
            }
        }
    }

    /// Seeds the cache from `(fingerprint, payload)` pairs, tolerating
    /// individual failures. Returns the number stored.
    pub async fn warm(&self, entries: Vec<(Fingerprint, serde_json::Value)>) -> usize {
        let mut warmed = 0;
        for (fingerprint, payload) in entries {
            self.set(&fingerprint, payload).await;
            warmed += 1;
        }
        tracing::info!(warmed, "cache warming complete");
        warmed
    }

    /// Statistics snapshot, including remote connectivity.
    pub fn stats(&self) -> CacheStatsSnapshot {
        let remote_connected = self
            .remote
            .as_ref()
            .map(|m| m.is_connected())
            .unwrap_or(false);
        self.stats.snapshot(remote_connected)
    }

    /// Clears hit/miss counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Health: local roundtrip latency plus a remote ping under timeout.
    /// Overall health tolerates a dead remote tier unless the strategy is
    /// `remote_only`.
    pub async fn health(&self) -> CacheHealthReport {
        let probe = Fingerprint::new(
            pagepilot_core::ContentType::WebResponse,
            "__cache_health__",
        );
        let key = probe.local_key();
        let started = Instant::now();
        let entry = CacheEntry::new(
            serde_json::json!({"probe": true}),
            60,
            probe.content_type,
        );
        self.memory.insert(key.clone(), entry);
        let local_healthy = self.memory.get(&key).is_some();
        self.memory.remove(&key);
        let local_latency = started.elapsed().as_millis() as u64;

        let remote = match &self.remote {
            Some(manager) => {
                let started = Instant::now();
                let ping = tokio::time::timeout(
                    Duration::from_millis(self.config.remote.connection_timeout_ms.max(1)),
                    manager.execute(|conn| async move { conn.ping().await }),
                )
                .await;
                let healthy = matches!(ping, Ok(Some(())));
                RemoteTierHealth {
                    enabled: true,
                    healthy,
                    connected: manager.is_connected(),
                    latency_ms: healthy.then(|| started.elapsed().as_millis() as u64),
                    error: match ping {
                        Ok(Some(())) => None,
                        Ok(None) => Some("remote cache unavailable".to_string()),
                        Err(_) => Some("remote cache ping timed out".to_string()),
                    },
                }
            }
            None => RemoteTierHealth {
                enabled: false,
                healthy: false,
                connected: false,
                latency_ms: None,
                error: None,
            },
        };

        let overall_healthy = local_healthy
            && (remote.healthy || self.config.strategy != CacheStrategy::RemoteOnly);

        CacheHealthReport {
            overall_healthy,
            memory_cache: MemoryTierHealth {
                healthy: local_healthy,
                latency_ms: local_latency,
                keys: self.memory.len(),
                max_keys: self.memory.max_keys(),
            },
            redis_cache: remote,
        }
    }

    /// Disconnects the remote tier (shutdown path).
    pub async fn shutdown(&self) {
        if let Some(manager) = &self.remote {
            manager.disconnect().await;
        }
    }

    /// Spawns the periodic expired-entry sweeper for the local tier.
    pub fn start_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = Duration::from_secs(self.config.memory.check_period_seconds.max(1));
        let service = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let purged = service.memory.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "swept expired cache entries");
                }
            }
        })
    }

    async fn remote_get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let manager = self.remote.as_ref()?;
        let key = fingerprint.remote_key(&self.config.remote.key_prefix);
        let result = self
            .breaker
            .execute(|| async {
                manager
                    .execute(|conn| async move { conn.get(&key).await })
                    .await
                    .ok_or_else(unavailable)
            })
            .await;

        match result {
            Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!(%fingerprint, %error, "discarding corrupt remote cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                tracing::debug!(%fingerprint, %error, "remote cache read failed");
                None
            }
        }
    }

    async fn remote_set(&self, fingerprint: &Fingerprint, entry: &CacheEntry) {
        let Some(manager) = self.remote.as_ref() else {
            return;
        };
        let key = fingerprint.remote_key(&self.config.remote.key_prefix);
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(%fingerprint, %error, "cache entry not serializable for remote tier");
                return;
            }
        };
        let ttl = Duration::from_secs(entry.ttl_seconds);
        let result = self
            .breaker
            .execute(|| async {
                manager
                    .execute(|conn| async move { conn.set(&key, raw, ttl).await })
                    .await
                    .ok_or_else(unavailable)
            })
            .await;
        if let Err(error) = result {
            tracing::debug!(%fingerprint, %error, "remote cache write failed");
        }
    }
}

fn unavailable() -> RemoteCacheError {
    RemoteCacheError::Unavailable("no remote connection".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryConnector;
    use pagepilot_core::ContentType;
    use serde_json::json;

    fn memory_only_service() -> CacheService {
        let registry = BreakerRegistry::new();
        CacheService::new(CacheConfig::default(), &registry, None)
    }

    fn hybrid_service(connector: Arc<InMemoryConnector>) -> CacheService {
        let config = CacheConfig {
            strategy: CacheStrategy::Hybrid,
            remote: crate::config::RemoteTierConfig {
                enabled: true,
                retry_delay_ms: 10,
                max_retry_delay_ms: 40,
                connection_retry_limit: 3,
                ..crate::config::RemoteTierConfig::default()
            },
            ..CacheConfig::default()
        };
        let registry = BreakerRegistry::new();
        CacheService::new(config, &registry, Some(connector))
    }

    #[tokio::test]
    async fn set_get_delete_memory_only() {
        let cache = memory_only_service();
        let fp = Fingerprint::new(ContentType::Runbooks, "rb-001");

        assert!(cache.get(&fp).await.is_none());
        cache.set(&fp, json!({"title": "disk full"})).await;
        assert_eq!(cache.get(&fp).await.unwrap()["title"], "disk full");

        assert!(cache.delete(&fp).await);
        assert!(cache.get(&fp).await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_operations, 3);
    }

    #[tokio::test]
    async fn disabled_cache_returns_nothing() {
        let registry = BreakerRegistry::new();
        let cache = CacheService::new(
            CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
            &registry,
            None,
        );
        let fp = Fingerprint::new(ContentType::Runbooks, "rb-001");
        cache.set(&fp, json!(1)).await;
        assert!(cache.get(&fp).await.is_none());
        assert_eq!(cache.stats().total_operations, 0);
    }

    #[tokio::test]
    async fn hybrid_write_through_and_promotion() {
        let connector = Arc::new(InMemoryConnector::new());
        let cache = hybrid_service(Arc::clone(&connector));
        cache.connect_remote().await;

        let fp = Fingerprint::new(ContentType::Procedures, "proc-9");
        cache.set(&fp, json!({"steps": 3})).await;
        assert_eq!(connector.len(), 1);

        // Drop the local copy; the next get must read through and promote.
        cache.memory.remove(&fp.local_key());
        assert_eq!(cache.get(&fp).await.unwrap()["steps"], 3);
        assert!(cache.memory.get(&fp.local_key()).is_some());

        // Served locally now.
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert!(stats.remote_connected);
    }

    #[tokio::test]
    async fn remote_outage_keeps_memory_serving() {
        let connector = Arc::new(InMemoryConnector::new());
        let cache = hybrid_service(Arc::clone(&connector));
        cache.connect_remote().await;

        connector.set_failing(true);
        let fp = Fingerprint::new(ContentType::Runbooks, "rb-7");
        cache.set(&fp, json!({"v": 1})).await;
        assert_eq!(cache.get(&fp).await.unwrap()["v"], 1);

        let health = cache.health().await;
        assert!(health.overall_healthy);
        assert!(!health.redis_cache.healthy);
        assert!(health.memory_cache.healthy);
    }

    #[tokio::test]
    async fn clear_by_type_is_scoped_and_idempotent() {
        let cache = memory_only_service();
        let rb = Fingerprint::new(ContentType::Runbooks, "a");
        let proc = Fingerprint::new(ContentType::Procedures, "a");
        cache.set(&rb, json!(1)).await;
        cache.set(&proc, json!(2)).await;

        assert_eq!(cache.clear_by_type(ContentType::Runbooks).await, 1);
        assert!(cache.get(&proc).await.is_some());

        let stats_before = cache.stats();
        assert_eq!(cache.clear_by_type(ContentType::Runbooks).await, 0);
        let stats_after = cache.stats();
        assert_eq!(
            stats_before.by_content_type["runbooks"].hits,
            stats_after.by_content_type["runbooks"].hits
        );
    }

    #[tokio::test]
    async fn warm_seeds_entries() {
        let cache = memory_only_service();
        let entries = vec![
            (Fingerprint::new(ContentType::Runbooks, "a"), json!(1)),
            (Fingerprint::new(ContentType::Runbooks, "b"), json!(2)),
        ];
        assert_eq!(cache.warm(entries).await, 2);
        assert!(cache
            .get(&Fingerprint::new(ContentType::Runbooks, "a"))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn strategy_ttl_override_applies() {
        let cache = memory_only_service();
        let fp = Fingerprint::new(ContentType::Runbooks, "short");
        cache.set_with_ttl(&fp, json!(1), 0).await;
        // TTL 0 expires immediately.
        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn memory_only_health_ignores_remote() {
        let cache = memory_only_service();
        let health = cache.health().await;
        assert!(health.overall_healthy);
        assert!(!health.redis_cache.enabled);
    }
}
