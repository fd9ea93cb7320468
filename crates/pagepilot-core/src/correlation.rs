//! Request correlation ids.
//!
//! Every request carries a correlation id that is echoed on the response and
//! stamped on every log line produced while handling it. Inbound ids are
//! accepted as-is when they are plausible; anything else is replaced with a
//! generated `req_<YYYYMMDDThhmmss>_<8 hex>` id.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted length for a caller-supplied correlation id.
pub const MAX_CORRELATION_ID_LEN: usize = 100;

/// A request-scoped correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh `req_<timestamp>_<8 hex>` id.
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let suffix: u32 = rand::thread_rng().gen();
        CorrelationId(format!("req_{stamp}_{suffix:08x}"))
    }

    /// Accepts `supplied` when present, non-empty and within the length cap;
    /// otherwise generates a replacement and logs the rejection.
    pub fn accept_or_generate(supplied: Option<&str>) -> Self {
        match supplied {
            Some(id) if !id.is_empty() && id.len() <= MAX_CORRELATION_ID_LEN => {
                CorrelationId(id.to_string())
            }
            Some(id) => {
                tracing::warn!(
                    supplied_len = id.len(),
                    "rejecting malformed inbound correlation id"
                );
                Self::generate()
            }
            None => Self::generate(),
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> String {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_expected_shape() {
        let id = CorrelationId::generate();
        let s = id.as_str();
        assert!(s.starts_with("req_"), "got {s}");
        // req_ + 15-char timestamp + _ + 8 hex
        assert_eq!(s.len(), 4 + 15 + 1 + 8, "got {s}");
    }

    #[test]
    fn accepts_plausible_inbound_id() {
        let id = CorrelationId::accept_or_generate(Some("trace-abc-123"));
        assert_eq!(id.as_str(), "trace-abc-123");
    }

    #[test]
    fn replaces_oversized_inbound_id() {
        let long = "x".repeat(MAX_CORRELATION_ID_LEN + 1);
        let id = CorrelationId::accept_or_generate(Some(&long));
        assert!(id.as_str().starts_with("req_"));
    }

    #[test]
    fn replaces_empty_inbound_id() {
        let id = CorrelationId::accept_or_generate(Some(""));
        assert!(id.as_str().starts_with("req_"));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b);
    }
}
