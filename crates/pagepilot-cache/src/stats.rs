//! Cache statistics.

use chrono::{DateTime, Utc};
use pagepilot_core::ContentType;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Per-content-type hit/miss counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ContentTypeCounters {
    pub hits: u64,
    pub misses: u64,
}

/// Serializable statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub total_operations: u64,
    pub hit_rate: f64,
    /// Keyed by content-type wire name; sub-counters sum to the top-level
    /// counters.
    pub by_content_type: HashMap<String, ContentTypeCounters>,
    pub last_reset: DateTime<Utc>,
    pub remote_connected: bool,
}

/// Atomic hit/miss counters, updated on every get.
pub(crate) struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    total_operations: AtomicU64,
    per_type: [TypeCell; ContentType::ALL.len()],
    last_reset: Mutex<DateTime<Utc>>,
}

#[derive(Default)]
struct TypeCell {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub(crate) fn new() -> Self {
        CacheStats {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            total_operations: AtomicU64::new(0),
            per_type: Default::default(),
            last_reset: Mutex::new(Utc::now()),
        }
    }

    pub(crate) fn record_hit(&self, content_type: ContentType) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.per_type[content_type.index()]
            .hits
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_lookups_total", "outcome" => "hit", "content_type" => content_type.as_str())
            .increment(1);
    }

    pub(crate) fn record_miss(&self, content_type: ContentType) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        self.per_type[content_type.index()]
            .misses
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_lookups_total", "outcome" => "miss", "content_type" => content_type.as_str())
            .increment(1);
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.total_operations.store(0, Ordering::Relaxed);
        for cell in &self.per_type {
            cell.hits.store(0, Ordering::Relaxed);
            cell.misses.store(0, Ordering::Relaxed);
        }
        *self.last_reset.lock().expect("stats lock poisoned") = Utc::now();
    }

    pub(crate) fn snapshot(&self, remote_connected: bool) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = self.total_operations.load(Ordering::Relaxed);
        let mut by_content_type = HashMap::new();
        for content_type in ContentType::ALL {
            let cell = &self.per_type[content_type.index()];
            by_content_type.insert(
                content_type.as_str().to_string(),
                ContentTypeCounters {
                    hits: cell.hits.load(Ordering::Relaxed),
                    misses: cell.misses.load(Ordering::Relaxed),
                },
            );
        }
        CacheStatsSnapshot {
            hits,
            misses,
            total_operations: total,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            by_content_type,
            last_reset: *self.last_reset.lock().expect("stats lock poisoned"),
            remote_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_equal_hits_plus_misses() {
        let stats = CacheStats::new();
        stats.record_hit(ContentType::Runbooks);
        stats.record_hit(ContentType::Procedures);
        stats.record_miss(ContentType::Runbooks);

        let snap = stats.snapshot(false);
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.total_operations, snap.hits + snap.misses);
        assert!((snap.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn per_type_counters_sum_to_totals() {
        let stats = CacheStats::new();
        stats.record_hit(ContentType::Runbooks);
        stats.record_miss(ContentType::KnowledgeBase);
        stats.record_miss(ContentType::KnowledgeBase);

        let snap = stats.snapshot(false);
        let type_hits: u64 = snap.by_content_type.values().map(|c| c.hits).sum();
        let type_misses: u64 = snap.by_content_type.values().map(|c| c.misses).sum();
        assert_eq!(type_hits, snap.hits);
        assert_eq!(type_misses, snap.misses);
    }

    #[test]
    fn empty_stats_report_zero_hit_rate() {
        let snap = CacheStats::new().snapshot(true);
        assert_eq!(snap.hit_rate, 0.0);
        assert!(snap.remote_connected);
    }

    #[test]
    fn reset_clears_counters_and_stamps() {
        let stats = CacheStats::new();
        stats.record_hit(ContentType::Runbooks);
        let before = stats.snapshot(false).last_reset;
        stats.reset();
        let snap = stats.snapshot(false);
        assert_eq!(snap.total_operations, 0);
        assert!(snap.last_reset >= before);
    }
}
