//! Shared fixtures for the integration tests.

use pagepilot_adapters::SourceConfig;
use pagepilot_cache::{CacheStrategy, ContentTypeCacheConfig};
use pagepilot_server::{AppConfig, AppState};
use std::path::PathBuf;

/// Writes a small runbook corpus into a fresh temp directory.
pub fn fixture_corpus(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "pagepilot-it-{tag}-{}-{}",
        std::process::id(),
        unique_suffix()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("fixture dir");

    let disk_full = serde_json::json!({
        "id": "rb-disk-full",
        "title": "Disk full on database hosts",
        "alert_types": ["disk_full"],
        "severities": ["critical", "high"],
        "systems": ["database", "production"],
        "triage_steps": [{"order": 1, "instruction": "Check df -h on the affected host"}],
        "procedures": [{
            "id": "proc-rotate-logs",
            "name": "Rotate logs",
            "description": "Reclaim space by rotating and compressing logs",
            "steps": [
                {"order": 1, "instruction": "Run logrotate --force"},
                {"order": 2, "instruction": "Verify free space with df -h"}
            ],
            "expected_outcome": "At least 20% free space"
        }],
        "decision_tree": {
            "id": "dt-disk-full",
            "name": "Disk full triage",
            "branches": [
                {"condition": "usage > 95%", "action": "page on-call"},
                {"condition": "usage > 85%", "action": "rotate logs"}
            ],
            "default_action": "open ticket"
        }
    });
    std::fs::write(dir.join("disk_full.json"), disk_full.to_string()).expect("fixture doc");

    let memory_leak = serde_json::json!({
        "id": "rb-memory-leak",
        "title": "Memory leak in API workers",
        "alert_types": ["oom_kill", "memory_pressure"],
        "severities": ["high", "medium"],
        "systems": ["api", "production"],
        "triage_steps": [{"order": 1, "instruction": "Inspect worker RSS growth"}]
    });
    std::fs::write(dir.join("memory_leak.json"), memory_leak.to_string()).expect("fixture doc");

    dir
}

fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// Configuration with one filesystem source and a memory-only cache whose
/// runbook entries live for 300 seconds.
pub fn test_config(corpus: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.max_request_mb = 10;
    config.sources = vec![SourceConfig {
        name: "local-docs".to_string(),
        adapter_type: "filesystem".to_string(),
        path: Some(corpus.to_path_buf()),
        timeout_ms: 2_000,
        refresh_interval_seconds: None,
    }];
    config.cache.strategy = CacheStrategy::MemoryOnly;
    config.cache.content_types.insert(
        "runbooks".to_string(),
        ContentTypeCacheConfig {
            ttl_seconds: 300,
            warmup: false,
        },
    );
    config.monitoring.enabled = false;
    config
}

/// Builds a full application state over a fresh fixture corpus.
pub async fn test_state(tag: &str) -> AppState {
    let corpus = fixture_corpus(tag);
    AppState::build(test_config(&corpus))
        .await
        .expect("state builds")
}
