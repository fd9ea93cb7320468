//! Cache fingerprints.
//!
//! A fingerprint is the `(content type, canonical identifier)` pair used as a
//! cache key. Search fingerprints are derived deterministically from the
//! request arguments so that semantically identical searches share an entry;
//! direct lookups use the raw id. Identity is full-tuple equality, so ids
//! never collide across content types.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use pagepilot_core::ContentType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub content_type: ContentType,
    pub id: String,
}

impl Fingerprint {
    /// Fingerprint from a stable identifier (direct lookups).
    pub fn new(content_type: ContentType, id: impl Into<String>) -> Self {
        Fingerprint {
            content_type,
            id: id.into(),
        }
    }

    /// Fingerprint for a search: the id is the URL-safe base64 of the
    /// canonicalized (key-sorted) argument JSON, so argument order never
    /// changes the key.
    pub fn for_search(content_type: ContentType, args: &serde_json::Value) -> Self {
        let canonical = canonical_json(args);
        Fingerprint {
            content_type,
            id: URL_SAFE_NO_PAD.encode(canonical.as_bytes()),
        }
    }

    /// Local-tier key: `<type>:<id>`.
    pub fn local_key(&self) -> String {
        format!("{}:{}", self.content_type.as_str(), self.id)
    }

    /// Remote-tier key: the configured prefix prepended to the local key.
    pub fn remote_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.local_key())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local_key())
    }
}

/// Serializes `value` with object keys sorted at every depth.
pub fn canonical_json(value: &serde_json::Value) -> String {
    fn write(value: &serde_json::Value, out: &mut String) {
        match value {
            serde_json::Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            serde_json::Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_fingerprint_is_order_insensitive() {
        let a = Fingerprint::for_search(
            ContentType::Runbooks,
            &json!({"alert_type": "disk_full", "severity": "critical"}),
        );
        let b = Fingerprint::for_search(
            ContentType::Runbooks,
            &json!({"severity": "critical", "alert_type": "disk_full"}),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let a = canonical_json(&json!({"b": {"y": 1, "x": 2}, "a": [3, {"q": 1, "p": 2}]}));
        let b = canonical_json(&json!({"a": [3, {"p": 2, "q": 1}], "b": {"x": 2, "y": 1}}));
        assert_eq!(a, b);
        assert_eq!(a, r#"{"a":[3,{"p":2,"q":1}],"b":{"x":2,"y":1}}"#);
    }

    #[test]
    fn identical_ids_differ_across_content_types() {
        let a = Fingerprint::new(ContentType::Runbooks, "db-001");
        let b = Fingerprint::new(ContentType::Procedures, "db-001");
        assert_ne!(a, b);
        assert_ne!(a.local_key(), b.local_key());
    }

    #[test]
    fn keys_carry_type_prefix() {
        let fp = Fingerprint::new(ContentType::KnowledgeBase, "abc");
        assert_eq!(fp.local_key(), "knowledge_base:abc");
        assert_eq!(fp.remote_key("pp:cache:"), "pp:cache:knowledge_base:abc");
    }
}
