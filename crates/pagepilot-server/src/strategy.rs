//! Cache strategy labels, TTL derivation and performance tiers.

use crate::tools::ToolName;
use pagepilot_core::ContentType;
use serde_json::Value;

/// TTL bounds for strategy-derived TTLs, in seconds.
pub const MIN_TTL_SECONDS: u64 = 300;
pub const MAX_TTL_SECONDS: u64 = 28_800;

/// Base TTL per strategy label, in seconds.
const STRATEGY_TTLS: [(&str, u64); 10] = [
    ("critical_incident", 7_200),
    ("high_priority_incident", 3_600),
    ("business_critical_query", 2_700),
    ("complex_query", 1_800),
    ("simple_query", 900),
    ("decision_logic", 5_400),
    ("procedure_steps", 4_320),
    ("metadata", 14_400),
    ("analytics", 300),
    ("standard", 600),
];

/// Picks the strategy label for one tool call from its arguments and hints.
pub fn strategy_for(tool: ToolName, args: &Value, hints: &Value) -> &'static str {
    match tool {
        ToolName::SearchRunbooks => match args.get("severity").and_then(Value::as_str) {
            Some("critical") => "critical_incident",
            Some("high") => "high_priority_incident",
            _ => "standard",
        },
        ToolName::SearchKnowledgeBase => {
            let business_critical = args
                .pointer("/context/business_critical")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let complexity = hints
                .get("complexity")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            if business_critical {
                "business_critical_query"
            } else if complexity >= 0.5 {
                "complex_query"
            } else {
                "simple_query"
            }
        }
        ToolName::GetDecisionTree => "decision_logic",
        ToolName::GetProcedure => "procedure_steps",
        ToolName::ListSources => "metadata",
        ToolName::GetEscalationPath => {
            match args.get("severity").and_then(Value::as_str) {
                Some("critical") => "critical_incident",
                _ => "standard",
            }
        }
        ToolName::RecordResolutionFeedback => "analytics",
    }
}

/// Base TTL for a strategy label. Unknown labels fall back to `standard`.
pub fn base_ttl_seconds(strategy: &str) -> u64 {
    STRATEGY_TTLS
        .iter()
        .find(|(label, _)| *label == strategy)
        .map(|(_, ttl)| *ttl)
        .unwrap_or(600)
}

/// Applies the time-of-day and content-freshness multipliers, then clamps to
/// `[MIN_TTL_SECONDS, MAX_TTL_SECONDS]`.
pub fn adjust_ttl(base_seconds: u64, content_type: ContentType, hour_of_day: u32) -> u64 {
    // Off-peak hours can hold entries longer; the evening shoulder slightly so.
    let time_multiplier = match hour_of_day {
        22..=23 | 0..=5 => 1.5,
        9..=17 => 1.0,
        _ => 1.25,
    };
    // Volatile content ages out faster than curated documents.
    let freshness_multiplier = match content_type {
        ContentType::Runbooks => 1.0,
        ContentType::Procedures | ContentType::DecisionTrees => 1.2,
        ContentType::KnowledgeBase => 0.8,
        ContentType::WebResponse => 0.5,
    };
    let adjusted = (base_seconds as f64 * time_multiplier * freshness_multiplier) as u64;
    adjusted.clamp(MIN_TTL_SECONDS, MAX_TTL_SECONDS)
}

/// Endpoint classes with distinct latency expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TierClass {
    /// Incident-facing endpoints: runbooks and escalation.
    Incident,
    /// Everything else.
    Standard,
}

fn tier_class(path: &str) -> TierClass {
    if path.contains("/runbooks") || path.contains("/escalation") {
        TierClass::Incident
    } else {
        TierClass::Standard
    }
}

/// Performance tier of one response given its path and elapsed time.
pub fn performance_tier(path: &str, elapsed_ms: u64) -> &'static str {
    let (excellent, good, acceptable, slow) = match tier_class(path) {
        TierClass::Incident => (150, 300, 500, 1_000),
        TierClass::Standard => (200, 500, 1_000, 2_000),
    };
    if elapsed_ms < excellent {
        "excellent"
    } else if elapsed_ms < good {
        "good"
    } else if elapsed_ms < acceptable {
        "acceptable"
    } else if elapsed_ms < slow {
        "slow"
    } else {
        "critical"
    }
}
