//! Cache configuration.

use pagepilot_core::ContentType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which tiers participate in reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Local tier only.
    MemoryOnly,
    /// Local tier first, remote tier on miss; writes go to both.
    Hybrid,
    /// All operations go to the remote tier.
    RemoteOnly,
}

impl Default for CacheStrategy {
    fn default() -> Self {
        CacheStrategy::MemoryOnly
    }
}

/// Local-tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryTierConfig {
    pub max_keys: usize,
    pub ttl_seconds: u64,
    /// Interval of the expired-entry sweeper.
    pub check_period_seconds: u64,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        MemoryTierConfig {
            max_keys: 1000,
            ttl_seconds: 3600,
            check_period_seconds: 600,
        }
    }
}

/// Remote-tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteTierConfig {
    pub enabled: bool,
    pub url: String,
    pub ttl_seconds: u64,
    pub key_prefix: String,
    pub connection_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub connection_retry_limit: u32,
}

impl Default for RemoteTierConfig {
    fn default() -> Self {
        RemoteTierConfig {
            enabled: false,
            url: "redis://localhost:6379".to_string(),
            ttl_seconds: 3600,
            key_prefix: "pp:cache:".to_string(),
            connection_timeout_ms: 5_000,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            connection_retry_limit: 5,
        }
    }
}

/// Per-content-type TTL override and warmup flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypeCacheConfig {
    pub ttl_seconds: u64,
    #[serde(default)]
    pub warmup: bool,
}

/// Full cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub strategy: CacheStrategy,
    pub memory: MemoryTierConfig,
    pub remote: RemoteTierConfig,
    /// Keyed by content-type wire name (`runbooks`, `procedures`, ...).
    pub content_types: HashMap<String, ContentTypeCacheConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            strategy: CacheStrategy::default(),
            memory: MemoryTierConfig::default(),
            remote: RemoteTierConfig::default(),
            content_types: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// TTL for `content_type`: the per-type override when configured, the
    /// local tier's default otherwise.
    pub fn ttl_for(&self, content_type: ContentType) -> u64 {
        self.content_types
            .get(content_type.as_str())
            .map(|c| c.ttl_seconds)
            .unwrap_or(self.memory.ttl_seconds)
    }
}
