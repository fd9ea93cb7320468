//! Filesystem-backed source adapter.
//!
//! Loads runbook documents (JSON or YAML) from a directory tree into an
//! in-memory index. Searches score token overlap; runbook matching scores
//! alert type, severity and system overlap.

use crate::adapter::{
    AdapterContent, AdapterError, AdapterHealth, AdapterMetadata, Runbook, RunbookMatch,
    SearchResult, SourceAdapter, SourceConfig,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagepilot_core::Severity;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::Instant;

struct Index {
    runbooks: HashMap<String, Runbook>,
    last_indexed: Option<DateTime<Utc>>,
}

/// Adapter over a local directory of runbook documents.
pub struct FileSystemAdapter {
    config: SourceConfig,
    index: RwLock<Index>,
}

impl FileSystemAdapter {
    /// Creates the adapter. The index is empty until `initialize`.
    pub fn new(config: SourceConfig) -> Self {
        FileSystemAdapter {
            config,
            index: RwLock::new(Index {
                runbooks: HashMap::new(),
                last_indexed: None,
            }),
        }
    }

    async fn load_tree(&self) -> Result<usize, AdapterError> {
        let root = self
            .config
            .path
            .clone()
            .ok_or_else(|| AdapterError::Io("filesystem adapter requires a path".to_string()))?;

        let mut runbooks = HashMap::new();
        let mut dirs = vec![root];
        while let Some(dir) = dirs.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| AdapterError::Io(format!("{}: {e}", dir.display())))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| AdapterError::Io(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    dirs.push(path);
                    continue;
                }
                match parse_document(&path).await {
                    Ok(Some(runbook)) => {
                        runbooks.insert(runbook.id.clone(), runbook);
                    }
                    Ok(None) => {}
                    Err(error) => {
                        // One bad document must not poison the index.
                        tracing::warn!(path = %path.display(), %error, "skipping document");
                    }
                }
            }
        }

        let count = runbooks.len();
        let mut index = self.index.write().expect("index poisoned");
        index.runbooks = runbooks;
        index.last_indexed = Some(Utc::now());
        tracing::info!(adapter = %self.config.name, documents = count, "filesystem index loaded");
        Ok(count)
    }
}

async fn parse_document(path: &Path) -> Result<Option<Runbook>, AdapterError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let parse_yaml = matches!(extension.as_str(), "yaml" | "yml");
    if extension != "json" && !parse_yaml {
        return Ok(None);
    }

    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AdapterError::Io(e.to_string()))?;
    let runbook = if parse_yaml {
        serde_yaml::from_str(&raw).map_err(|e| AdapterError::Parse(e.to_string()))?
    } else {
        serde_json::from_str(&raw).map_err(|e| AdapterError::Parse(e.to_string()))?
    };
    Ok(Some(runbook))
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

fn score_runbook(
    runbook: &Runbook,
    alert_type: &str,
    severity: Severity,
    systems: &[String],
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut matched = Vec::new();

    let alert_lower = alert_type.to_lowercase();
    if runbook
        .alert_types
        .iter()
        .any(|t| t.to_lowercase() == alert_lower)
    {
        score += 0.5;
        matched.push("alert_type".to_string());
    } else if runbook
        .alert_types
        .iter()
        .any(|t| t.to_lowercase().contains(&alert_lower) || alert_lower.contains(&t.to_lowercase()))
    {
        score += 0.2;
        matched.push("alert_type~".to_string());
    }

    if runbook.severities.contains(&severity) {
        score += 0.2;
        matched.push("severity".to_string());
    }

    if !systems.is_empty() {
        let overlap = systems
            .iter()
            .filter(|s| runbook.systems.iter().any(|rs| rs.eq_ignore_ascii_case(s)))
            .count();
        if overlap > 0 {
            score += 0.3 * overlap as f64 / systems.len() as f64;
            matched.push("systems".to_string());
        }
    }

    (score.min(1.0), matched)
}

#[async_trait]
impl SourceAdapter for FileSystemAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        self.load_tree().await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        _filters: Option<&serde_json::Value>,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.index.read().expect("index poisoned");
        let mut results: Vec<SearchResult> = index
            .runbooks
            .values()
            .filter_map(|runbook| {
                let haystack = tokenize(&format!(
                    "{} {} {}",
                    runbook.title,
                    runbook.alert_types.join(" "),
                    runbook.systems.join(" ")
                ));
                let hits = terms.iter().filter(|t| haystack.contains(t)).count();
                if hits == 0 {
                    return None;
                }
                Some(SearchResult {
                    id: runbook.id.clone(),
                    title: runbook.title.clone(),
                    snippet: runbook
                        .triage_steps
                        .first()
                        .map(|s| s.instruction.clone())
                        .unwrap_or_else(|| runbook.title.clone()),
                    score: hits as f64 / terms.len() as f64,
                    source: self.config.name.clone(),
                    url: None,
                })
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }

    async fn search_runbooks(
        &self,
        alert_type: &str,
        severity: Severity,
        systems: &[String],
    ) -> Result<Vec<RunbookMatch>, AdapterError> {
        let index = self.index.read().expect("index poisoned");
        let mut matches: Vec<RunbookMatch> = index
            .runbooks
            .values()
            .filter_map(|runbook| {
                let (score, matched_on) = score_runbook(runbook, alert_type, severity, systems);
                if score <= 0.0 {
                    return None;
                }
                Some(RunbookMatch {
                    runbook: runbook.clone(),
                    score,
                    matched_on,
                    source: self.config.name.clone(),
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(matches)
    }

    async fn get_document(&self, id: &str) -> Result<Option<AdapterContent>, AdapterError> {
        let index = self.index.read().expect("index poisoned");
        if let Some(runbook) = index.runbooks.get(id) {
            let value =
                serde_json::to_value(runbook).map_err(|e| AdapterError::Parse(e.to_string()))?;
            return Ok(Some(AdapterContent::Structured(value)));
        }
        // Nested procedures and decision trees are addressable by their own
        // ids.
        for runbook in index.runbooks.values() {
            if let Some(procedure) = runbook.procedures.iter().find(|p| p.id == id) {
                let value = serde_json::to_value(procedure)
                    .map_err(|e| AdapterError::Parse(e.to_string()))?;
                return Ok(Some(AdapterContent::Structured(value)));
            }
            if let Some(tree) = runbook.decision_tree.as_ref().filter(|t| t.id == id) {
                let value =
                    serde_json::to_value(tree).map_err(|e| AdapterError::Parse(e.to_string()))?;
                return Ok(Some(AdapterContent::Structured(value)));
            }
        }
        Ok(None)
    }

    async fn health_check(&self) -> AdapterHealth {
        let started = Instant::now();
        let ready = {
            let index = self.index.read().expect("index poisoned");
            index.last_indexed.is_some()
        };
        AdapterHealth {
            name: self.config.name.clone(),
            healthy: ready,
            response_time_ms: started.elapsed().as_millis() as u64,
            error: (!ready).then(|| "index not loaded".to_string()),
        }
    }

    async fn metadata(&self) -> AdapterMetadata {
        let index = self.index.read().expect("index poisoned");
        AdapterMetadata {
            name: self.config.name.clone(),
            adapter_type: self.config.adapter_type.clone(),
            document_count: index.runbooks.len(),
            ready: index.last_indexed.is_some(),
            last_indexed: index.last_indexed,
        }
    }

    async fn refresh_index(&self, force: bool) -> Result<usize, AdapterError> {
        let stale = {
            let index = self.index.read().expect("index poisoned");
            match (index.last_indexed, self.config.refresh_interval_seconds) {
                (Some(at), Some(interval)) => {
                    Utc::now().signed_duration_since(at).num_seconds() >= interval as i64
                }
                (None, _) => true,
                (_, None) => false,
            }
        };
        if force || stale {
            self.load_tree().await
        } else {
            let index = self.index.read().expect("index poisoned");
            Ok(index.runbooks.len())
        }
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        let mut index = self.index.write().expect("index poisoned");
        index.runbooks.clear();
        index.last_indexed = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pagepilot-fs-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_disk_full_runbook(dir: &Path) {
        let doc = serde_json::json!({
            "id": "rb-disk-full",
            "title": "Disk full on database hosts",
            "alert_types": ["disk_full"],
            "severities": ["critical", "high"],
            "systems": ["database", "production"],
            "triage_steps": [{"order": 1, "instruction": "Check df -h"}],
            "procedures": [{
                "id": "proc-rotate",
                "name": "Rotate logs",
                "steps": [{"order": 1, "instruction": "logrotate --force"}]
            }],
            "decision_tree": {
                "id": "dt-disk",
                "name": "Disk triage",
                "branches": [{"condition": "usage > 95%", "action": "page"}],
                "default_action": "ticket"
            }
        });
        std::fs::write(dir.join("disk_full.json"), doc.to_string()).unwrap();
    }

    fn adapter_for(dir: &Path) -> FileSystemAdapter {
        FileSystemAdapter::new(SourceConfig {
            name: "local-docs".to_string(),
            adapter_type: "filesystem".to_string(),
            path: Some(dir.to_path_buf()),
            timeout_ms: 1000,
            refresh_interval_seconds: None,
        })
    }

    #[tokio::test]
    async fn indexes_json_and_yaml_documents() {
        let dir = fixture_dir("index");
        write_disk_full_runbook(&dir);
        std::fs::write(
            dir.join("memory.yaml"),
            r#"
id: rb-oom
title: Out of memory
alert_types: [oom_kill]
severities: [high]
systems: [production]
"#,
        )
        .unwrap();
        // Unknown extensions are ignored.
        std::fs::write(dir.join("README.md"), "not a runbook").unwrap();

        let adapter = adapter_for(&dir);
        adapter.initialize().await.unwrap();
        assert_eq!(adapter.metadata().await.document_count, 2);
        assert!(adapter.health_check().await.healthy);
    }

    #[tokio::test]
    async fn runbook_search_scores_matches() {
        let dir = fixture_dir("search");
        write_disk_full_runbook(&dir);
        let adapter = adapter_for(&dir);
        adapter.initialize().await.unwrap();

        let matches = adapter
            .search_runbooks(
                "disk_full",
                Severity::Critical,
                &["production".to_string(), "database".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score > 0.9);
        assert!(matches[0].matched_on.contains(&"alert_type".to_string()));

        let none = adapter
            .search_runbooks("certificate_expiry", Severity::Low, &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn documents_resolve_by_nested_ids() {
        let dir = fixture_dir("docs");
        write_disk_full_runbook(&dir);
        let adapter = adapter_for(&dir);
        adapter.initialize().await.unwrap();

        let runbook = adapter.get_document("rb-disk-full").await.unwrap().unwrap();
        let procedure = adapter.get_document("proc-rotate").await.unwrap().unwrap();
        let tree = adapter.get_document("dt-disk").await.unwrap().unwrap();
        for content in [&runbook, &procedure, &tree] {
            assert!(matches!(content, AdapterContent::Structured(_)));
        }
        assert!(adapter.get_document("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn free_text_search_ranks_by_overlap() {
        let dir = fixture_dir("text");
        write_disk_full_runbook(&dir);
        let adapter = adapter_for(&dir);
        adapter.initialize().await.unwrap();

        let hits = adapter.search("database disk", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "rb-disk-full");
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn cleanup_empties_the_index() {
        let dir = fixture_dir("cleanup");
        write_disk_full_runbook(&dir);
        let adapter = adapter_for(&dir);
        adapter.initialize().await.unwrap();
        adapter.cleanup().await.unwrap();
        assert!(!adapter.health_check().await.healthy);
        assert_eq!(adapter.refresh_index(true).await.unwrap(), 1);
    }
}
