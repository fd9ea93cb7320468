//! Per-tool request transforms: sanitization, normalization and enrichment.

use crate::tools::ToolName;
use crate::validation::severity_from;
use pagepilot_core::{error::strip_sensitive_fields, PipelineError, Severity};
use serde_json::{json, Value};
use std::time::Duration;

/// Field names that must never survive into dispatch.
const DANGEROUS_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// The transformed request handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct TransformedRequest {
    pub args: Value,
    /// Severity-tiered overall timeout, when the tool defines one.
    pub timeout: Option<Duration>,
    /// Enrichment computed from the arguments (scores, complexity).
    pub hints: Value,
}

/// Applies the common sanitization pass and the tool-specific transform.
pub fn transform(tool: ToolName, mut args: Value) -> Result<TransformedRequest, PipelineError> {
    sanitize(&mut args);

    match tool {
        ToolName::SearchKnowledgeBase => transform_knowledge_base(args),
        ToolName::SearchRunbooks => transform_runbooks(args),
        ToolName::GetEscalationPath => transform_escalation(args),
        ToolName::GetProcedure | ToolName::GetDecisionTree => Ok(identity(args)),
        ToolName::ListSources => {
            let map = ensure_object(&mut args);
            map.entry("include_health").or_insert(json!(true));
            Ok(identity(args))
        }
        ToolName::RecordResolutionFeedback => {
            let map = ensure_object(&mut args);
            map.entry("notes").or_insert(json!(""));
            Ok(identity(args))
        }
    }
}

fn identity(args: Value) -> TransformedRequest {
    TransformedRequest {
        args,
        timeout: Some(Duration::from_secs(10)),
        hints: Value::Null,
    }
}

fn ensure_object(args: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !args.is_object() {
        *args = json!({});
    }
    args.as_object_mut().expect("just ensured object")
}

/// Strips dangerous key names, embedded markup in strings, and sensitive
/// fields in free-form context maps.
pub fn sanitize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !DANGEROUS_KEYS.contains(&key.as_str()));
            let context_keys: Vec<String> = map
                .iter()
                .filter(|(key, value)| key.as_str() == "context" && value.is_object())
                .map(|(key, _)| key.clone())
                .collect();
            for key in context_keys {
                if let Some(context) = map.get_mut(&key) {
                    strip_sensitive_fields(context);
                }
            }
            for nested in map.values_mut() {
                sanitize(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize(item);
            }
        }
        Value::String(s) => {
            *s = strip_markup(s);
        }
        _ => {}
    }
}

/// Removes `<...>` tag sequences and `javascript:` scheme prefixes.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    while let Some(at) = find_ascii_ci(&out, "javascript:") {
        out.replace_range(at..at + "javascript:".len(), "");
    }
    out
}

/// ASCII-case-insensitive substring search. The needle is ASCII, so a match
/// offset is always a char boundary.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

fn transform_knowledge_base(mut args: Value) -> Result<TransformedRequest, PipelineError> {
    let query = args
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    if query.chars().count() < 2 {
        return Err(PipelineError::validation(
            "query must be at least 2 characters after trimming",
        ));
    }
    if query.chars().count() > 500 {
        return Err(PipelineError::validation(
            "query must be at most 500 characters",
        ));
    }

    let terms = query.split_whitespace().count();
    let upper = query.to_uppercase();
    let has_operators = upper.contains(" AND ")
        || upper.contains(" OR ")
        || upper.contains(" NOT ")
        || query.contains('"');
    let has_wildcards = query.contains('*') || query.contains('?');
    let lowered = query.to_lowercase();
    let has_injection = ["<script", "javascript:", "$ne", "$where", "drop table"]
        .iter()
        .any(|pattern| lowered.contains(pattern));

    let mut complexity = (terms as f64 / 10.0).min(0.7);
    if has_operators {
        complexity += 0.2;
    }
    if has_wildcards {
        complexity += 0.1;
    }
    let complexity = complexity.clamp(0.0, 1.0);

    let mobile = args
        .pointer("/context/user_agent")
        .and_then(Value::as_str)
        .map(|ua| ua.contains("Mobile") || ua.contains("Android") || ua.contains("iPhone"))
        .unwrap_or(false);

    let requested = args
        .get("max_results")
        .and_then(Value::as_i64)
        .unwrap_or(20);
    let mut max_results = requested.clamp(1, 100);
    if complexity > 0.7 {
        max_results = max_results.min(25);
    }
    if mobile {
        max_results = max_results.min(10);
    }

    let map = ensure_object(&mut args);
    map.insert("query".into(), json!(query));
    map.insert("max_results".into(), json!(max_results));

    Ok(TransformedRequest {
        args,
        timeout: Some(Duration::from_secs(10)),
        hints: json!({
            "complexity": complexity,
            "term_count": terms,
            "has_operators": has_operators,
            "has_wildcards": has_wildcards,
            "suspected_injection": has_injection,
            "mobile_client": mobile,
        }),
    })
}

fn transform_runbooks(mut args: Value) -> Result<TransformedRequest, PipelineError> {
    let alert_type = args
        .get("alert_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if alert_type.is_empty() {
        return Err(PipelineError::validation("alert_type must not be empty"));
    }

    let severity = severity_from(&args, "severity").ok_or_else(|| {
        PipelineError::validation("severity must be one of critical, high, medium, low, info")
    })?;

    let mut systems: Vec<String> = args
        .get("affected_systems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    systems.sort();
    systems.dedup();
    if systems.is_empty() {
        return Err(PipelineError::validation(
            "affected_systems must contain at least one non-empty system",
        ));
    }

    let touches_production = systems
        .iter()
        .any(|s| s.contains("prod") || s.contains("database"));
    let urgency = (severity.urgency_base() + if touches_production { 0.1 } else { 0.0 }).min(1.0);

    let business_critical = systems.iter().any(|s| {
        s.contains("payment") || s.contains("auth") || s.contains("billing")
    });
    let business_impact = if touches_production && business_critical {
        0.9
    } else if touches_production {
        0.6
    } else {
        0.3
    };

    let risk_score = 0.6 * urgency + 0.4 * business_impact;
    let cache_priority = match severity {
        Severity::Critical | Severity::High => "high",
        Severity::Medium => "medium",
        _ => "low",
    };
    let timeout = match severity {
        Severity::Critical => Duration::from_secs(3),
        Severity::High => Duration::from_secs(5),
        _ => Duration::from_secs(10),
    };

    let map = ensure_object(&mut args);
    map.insert("alert_type".into(), json!(alert_type));
    map.insert("affected_systems".into(), json!(systems));

    Ok(TransformedRequest {
        args,
        timeout: Some(timeout),
        hints: json!({
            "urgency_score": urgency,
            "business_impact": business_impact,
            "risk_score": risk_score,
            "cache_priority": cache_priority,
            "suggested_timeout_ms": timeout.as_millis() as u64,
        }),
    })
}

fn transform_escalation(mut args: Value) -> Result<TransformedRequest, PipelineError> {
    let map = ensure_object(&mut args);
    map.entry("failed_attempts").or_insert(json!(0));
    Ok(TransformedRequest {
        args,
        timeout: Some(Duration::from_secs(5)),
        hints: Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangerous_keys_are_dropped() {
        let mut value = json!({
            "__proto__": {"polluted": true},
            "constructor": "hack",
            "query": "disk full",
            "nested": {"prototype": 1, "ok": 2}
        });
        sanitize(&mut value);
        assert!(value.get("__proto__").is_none());
        assert!(value.get("constructor").is_none());
        assert!(value["nested"].get("prototype").is_none());
        assert_eq!(value["nested"]["ok"], 2);
    }

    #[test]
    fn markup_is_stripped_from_strings() {
        assert_eq!(
            strip_markup("check <script>alert(1)</script>disk"),
            "check alert(1)disk"
        );
        assert_eq!(strip_markup("javascript:alert(1)"), "alert(1)");
        assert_eq!(strip_markup("plain text"), "plain text");
    }

    #[test]
    fn context_credentials_are_removed() {
        let mut value = json!({
            "query": "db",
            "context": {"api_token": "x", "region": "us-east-1"}
        });
        sanitize(&mut value);
        assert!(value["context"].get("api_token").is_none());
        assert_eq!(value["context"]["region"], "us-east-1");
    }

    #[test]
    fn whitespace_query_is_rejected_after_trim() {
        let err = transform(ToolName::SearchKnowledgeBase, json!({"query": "  a  "}))
            .unwrap_err();
        assert!(err.to_string().contains("at least 2 characters"));
    }

    #[test]
    fn complexity_caps_results() {
        let out = transform(
            ToolName::SearchKnowledgeBase,
            json!({
                "query": "how to recover a degraded raid array AND rebalance data OR failover replica *",
                "max_results": 80
            }),
        )
        .unwrap();
        assert!(out.hints["complexity"].as_f64().unwrap() > 0.7);
        assert_eq!(out.args["max_results"], 25);
    }

    #[test]
    fn mobile_clients_get_fewer_results() {
        let out = transform(
            ToolName::SearchKnowledgeBase,
            json!({
                "query": "disk full",
                "max_results": 50,
                "context": {"user_agent": "Mozilla/5.0 (iPhone) Mobile Safari"}
            }),
        )
        .unwrap();
        assert_eq!(out.args["max_results"], 10);
    }

    #[test]
    fn runbook_transform_normalizes_systems_and_scores() {
        let out = transform(
            ToolName::SearchRunbooks,
            json!({
                "alert_type": "disk_full",
                "severity": "critical",
                "affected_systems": [" Production ", "database", "production", ""]
            }),
        )
        .unwrap();
        assert_eq!(out.args["affected_systems"], json!(["database", "production"]));
        assert!(out.hints["urgency_score"].as_f64().unwrap() >= 0.9);
        assert_eq!(out.hints["cache_priority"], "high");
        assert_eq!(out.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn severity_tiers_select_timeouts() {
        for (severity, secs) in [("critical", 3), ("high", 5), ("medium", 10), ("info", 10)] {
            let out = transform(
                ToolName::SearchRunbooks,
                json!({
                    "alert_type": "cpu",
                    "severity": severity,
                    "affected_systems": ["api"]
                }),
            )
            .unwrap();
            assert_eq!(out.timeout, Some(Duration::from_secs(secs)), "{severity}");
        }
    }

    #[test]
    fn empty_systems_after_normalization_fail() {
        let err = transform(
            ToolName::SearchRunbooks,
            json!({
                "alert_type": "cpu",
                "severity": "high",
                "affected_systems": ["   ", ""]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn escalation_defaults_failed_attempts() {
        let out = transform(
            ToolName::GetEscalationPath,
            json!({"severity": "high", "business_hours": true}),
        )
        .unwrap();
        assert_eq!(out.args["failed_attempts"], 0);
    }
}
