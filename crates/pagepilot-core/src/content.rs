//! The closed set of cacheable content types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content-type tag of a cache fingerprint.
///
/// The set is closed: a fingerprint never crosses tags even when raw
/// identifiers collide, so every tag gets its own key namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Runbooks,
    Procedures,
    DecisionTrees,
    KnowledgeBase,
    WebResponse,
}

impl ContentType {
    /// All known tags, in a stable order used for per-type counters.
    pub const ALL: [ContentType; 5] = [
        ContentType::Runbooks,
        ContentType::Procedures,
        ContentType::DecisionTrees,
        ContentType::KnowledgeBase,
        ContentType::WebResponse,
    ];

    /// Wire/key name of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Runbooks => "runbooks",
            ContentType::Procedures => "procedures",
            ContentType::DecisionTrees => "decision_trees",
            ContentType::KnowledgeBase => "knowledge_base",
            ContentType::WebResponse => "web_response",
        }
    }

    /// Stable index into per-type counter arrays.
    pub fn index(&self) -> usize {
        match self {
            ContentType::Runbooks => 0,
            ContentType::Procedures => 1,
            ContentType::DecisionTrees => 2,
            ContentType::KnowledgeBase => 3,
            ContentType::WebResponse => 4,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "runbooks" => Ok(ContentType::Runbooks),
            "procedures" => Ok(ContentType::Procedures),
            "decision_trees" => Ok(ContentType::DecisionTrees),
            "knowledge_base" => Ok(ContentType::KnowledgeBase),
            "web_response" => Ok(ContentType::WebResponse),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense_and_stable() {
        for (i, ct) in ContentType::ALL.iter().enumerate() {
            assert_eq!(ct.index(), i);
        }
    }

    #[test]
    fn round_trips_wire_names() {
        for ct in ContentType::ALL {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
        }
    }
}
