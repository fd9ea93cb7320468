//! The bounded in-process cache tier.

use crate::entry::CacheEntry;
use chrono::Utc;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// LRU-bounded local tier. Expired entries are removed when probed and by the
/// periodic sweeper.
pub struct MemoryTier {
    store: Mutex<LruCache<String, CacheEntry>>,
    default_ttl_seconds: u64,
    max_keys: usize,
}

impl MemoryTier {
    /// Creates a tier capped at `max_keys` entries.
    pub fn new(max_keys: usize, default_ttl_seconds: u64) -> Self {
        let cap = NonZeroUsize::new(max_keys.max(1)).expect("max(1) is non-zero");
        MemoryTier {
            store: Mutex::new(LruCache::new(cap)),
            default_ttl_seconds,
            max_keys: max_keys.max(1),
        }
    }

    /// Default TTL applied when no per-content-type override exists.
    pub fn default_ttl_seconds(&self) -> u64 {
        self.default_ttl_seconds
    }

    /// Key cap.
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Returns the live entry for `key`, removing it if expired.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut store = self.store.lock().expect("memory tier lock poisoned");
        let expired = match store.get(key) {
            Some(entry) if entry.is_expired(Utc::now()) => true,
            Some(entry) => return Some(entry.clone()),
            None => return None,
        };
        if expired {
            store.pop(key);
        }
        None
    }

    /// Inserts an entry, evicting the least-recently-used one at capacity.
    pub fn insert(&self, key: String, entry: CacheEntry) {
        self.store
            .lock()
            .expect("memory tier lock poisoned")
            .put(key, entry);
    }

    /// Removes one key. Returns true when it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.store
            .lock()
            .expect("memory tier lock poisoned")
            .pop(key)
            .is_some()
    }

    /// Removes every key whose serialized form starts with `prefix`.
    /// Returns the number removed.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut store = self.store.lock().expect("memory tier lock poisoned");
        let doomed: Vec<String> = store
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            store.pop(key);
        }
        doomed.len()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.store
            .lock()
            .expect("memory tier lock poisoned")
            .clear();
    }

    /// Current number of entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.store.lock().expect("memory tier lock poisoned").len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries. Returns the number purged.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut store = self.store.lock().expect("memory tier lock poisoned");
        let doomed: Vec<String> = store
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            store.pop(key);
        }
        doomed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepilot_core::ContentType;
    use serde_json::json;

    fn entry(ttl: u64) -> CacheEntry {
        CacheEntry::new(json!({"v": 1}), ttl, ContentType::Runbooks)
    }

    #[test]
    fn insert_then_get() {
        let tier = MemoryTier::new(10, 300);
        tier.insert("runbooks:a".into(), entry(300));
        assert!(tier.get("runbooks:a").is_some());
        assert!(tier.get("runbooks:b").is_none());
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn expired_entry_is_removed_on_probe() {
        let tier = MemoryTier::new(10, 300);
        tier.insert("runbooks:a".into(), entry(0));
        assert!(tier.get("runbooks:a").is_none());
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let tier = MemoryTier::new(2, 300);
        tier.insert("runbooks:a".into(), entry(300));
        tier.insert("runbooks:b".into(), entry(300));
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(tier.get("runbooks:a").is_some());
        tier.insert("runbooks:c".into(), entry(300));

        assert!(tier.get("runbooks:a").is_some());
        assert!(tier.get("runbooks:b").is_none());
        assert!(tier.get("runbooks:c").is_some());
    }

    #[test]
    fn remove_prefix_only_hits_matching_type() {
        let tier = MemoryTier::new(10, 300);
        tier.insert("runbooks:a".into(), entry(300));
        tier.insert("runbooks:b".into(), entry(300));
        tier.insert("procedures:a".into(), entry(300));

        assert_eq!(tier.remove_prefix("runbooks:"), 2);
        assert_eq!(tier.len(), 1);
        assert!(tier.get("procedures:a").is_some());
    }

    #[test]
    fn purge_drops_only_expired() {
        let tier = MemoryTier::new(10, 300);
        tier.insert("runbooks:live".into(), entry(300));
        tier.insert("runbooks:dead".into(), entry(0));
        assert_eq!(tier.purge_expired(), 1);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn clear_empties_the_tier() {
        let tier = MemoryTier::new(10, 300);
        tier.insert("runbooks:a".into(), entry(300));
        tier.clear();
        assert!(tier.is_empty());
    }
}
