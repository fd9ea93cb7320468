//! The adapter contract and the document model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagepilot_core::Severity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Adapter failure modes.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("io error: {0}")]
    Io(String),
    #[error("document parse error: {0}")]
    Parse(String),
    #[error("adapter not initialized")]
    NotInitialized,
    #[error("operation not supported: {0}")]
    Unsupported(String),
}

/// Per-source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub adapter_type: String,
    /// Root of the document tree for filesystem sources.
    #[serde(default)]
    pub path: Option<std::path::PathBuf>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub refresh_interval_seconds: Option<u64>,
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// One step of a procedure or triage list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureStep {
    pub order: u32,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_result: Option<String>,
}

/// An executable remediation procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<ProcedureStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
}

/// One branch of a decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionBranch {
    pub condition: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Decision logic attached to a runbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub id: String,
    pub name: String,
    pub branches: Vec<DecisionBranch>,
    pub default_action: String,
}

/// A structured runbook document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runbook {
    pub id: String,
    pub title: String,
    pub alert_types: Vec<String>,
    pub severities: Vec<Severity>,
    pub systems: Vec<String>,
    #[serde(default)]
    pub triage_steps: Vec<ProcedureStep>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_tree: Option<DecisionTree>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A scored runbook hit.
#[derive(Debug, Clone, Serialize)]
pub struct RunbookMatch {
    pub runbook: Runbook,
    /// Match confidence in `[0, 1]`.
    pub score: f64,
    /// Which request fields matched (alert type, severity, systems).
    pub matched_on: Vec<String>,
    pub source: String,
}

/// A scored free-text search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Dynamic document content: either raw text (deserialized opportunistically
/// by the shaping layer) or an already-structured tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum AdapterContent {
    Text(String),
    Structured(serde_json::Value),
}

/// Health report of one adapter. Checks must be cheap.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterHealth {
    pub name: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Descriptive metadata for the sources listing.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterMetadata {
    pub name: String,
    pub adapter_type: String,
    pub document_count: usize,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
}

/// The uniform contract every backing source implements.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Adapter instance name (unique within the registry).
    fn name(&self) -> &str;

    /// This adapter's configuration.
    fn config(&self) -> &SourceConfig;

    /// Loads or connects the source; called once by the registry.
    async fn initialize(&self) -> Result<(), AdapterError>;

    /// Free-text search over the source.
    async fn search(
        &self,
        query: &str,
        filters: Option<&serde_json::Value>,
    ) -> Result<Vec<SearchResult>, AdapterError>;

    /// Structured runbook search by alert characteristics.
    async fn search_runbooks(
        &self,
        alert_type: &str,
        severity: Severity,
        systems: &[String],
    ) -> Result<Vec<RunbookMatch>, AdapterError>;

    /// Fetches one document by id.
    async fn get_document(&self, id: &str) -> Result<Option<AdapterContent>, AdapterError>;

    /// Cheap health probe.
    async fn health_check(&self) -> AdapterHealth;

    /// Descriptive metadata.
    async fn metadata(&self) -> AdapterMetadata;

    /// Re-reads the backing source. Returns the indexed document count.
    async fn refresh_index(&self, force: bool) -> Result<usize, AdapterError>;

    /// Tears the adapter down.
    async fn cleanup(&self) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runbook_parses_from_json() {
        let raw = serde_json::json!({
            "id": "rb-disk-full",
            "title": "Disk full on database hosts",
            "alert_types": ["disk_full"],
            "severities": ["critical", "high"],
            "systems": ["database", "production"],
            "triage_steps": [
                {"order": 1, "instruction": "Check df -h on the affected host"}
            ],
            "procedures": [{
                "id": "proc-rotate-logs",
                "name": "Rotate logs",
                "steps": [{"order": 1, "instruction": "logrotate --force"}]
            }],
            "decision_tree": {
                "id": "dt-disk-full",
                "name": "Disk full triage",
                "branches": [{"condition": "usage > 95%", "action": "page on-call"}],
                "default_action": "open ticket"
            }
        });
        let runbook: Runbook = serde_json::from_value(raw).unwrap();
        assert_eq!(runbook.severities[0], Severity::Critical);
        assert_eq!(runbook.procedures.len(), 1);
        assert!(runbook.decision_tree.is_some());
    }

    #[test]
    fn adapter_content_is_kind_tagged() {
        let text = AdapterContent::Text("{\"a\":1}".into());
        let wire = serde_json::to_value(&text).unwrap();
        assert_eq!(wire["kind"], "text");
        assert_eq!(wire["payload"], "{\"a\":1}");

        let structured = AdapterContent::Structured(serde_json::json!({"a": 1}));
        let wire = serde_json::to_value(&structured).unwrap();
        assert_eq!(wire["kind"], "structured");
    }
}
