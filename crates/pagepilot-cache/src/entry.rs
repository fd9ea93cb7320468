//! Cache entries.

use chrono::{DateTime, Utc};
use pagepilot_core::ContentType;
use serde::{Deserialize, Serialize};

/// One immutable cache entry. Updates replace the whole entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub inserted_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub content_type: ContentType,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(payload: serde_json::Value, ttl_seconds: u64, content_type: ContentType) -> Self {
        CacheEntry {
            payload,
            inserted_at: Utc::now(),
            ttl_seconds,
            content_type,
        }
    }

    /// True once the entry has outlived its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.inserted_at);
        age.num_seconds() >= self.ttl_seconds as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn fresh_entry_is_not_expired() {
        let entry = CacheEntry::new(json!({"x": 1}), 300, ContentType::Runbooks);
        assert!(!entry.is_expired(Utc::now()));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let entry = CacheEntry::new(json!({"x": 1}), 300, ContentType::Runbooks);
        let later = Utc::now() + Duration::seconds(301);
        assert!(entry.is_expired(later));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let entry = CacheEntry::new(json!(null), 0, ContentType::WebResponse);
        assert!(entry.is_expired(Utc::now()));
    }

    #[test]
    fn survives_remote_round_trip() {
        let entry = CacheEntry::new(json!({"steps": ["a", "b"]}), 600, ContentType::Procedures);
        let wire = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.payload, entry.payload);
        assert_eq!(back.ttl_seconds, 600);
        assert_eq!(back.content_type, ContentType::Procedures);
    }
}
