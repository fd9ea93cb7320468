//! Per-tool argument validation.
//!
//! Each tool carries a closed-form rule record: recognized fields, the
//! required set, per-field type/range/enum constraints, and whether extra
//! fields are rejected. The same records render the JSON-schema descriptions
//! served by `tools/list`.

use crate::tools::ToolName;
use pagepilot_core::Severity;
use serde_json::Value;

const SEVERITIES: &[&str] = &["critical", "high", "medium", "low", "info"];
const FEEDBACK_OUTCOMES: &[&str] = &["resolved", "escalated", "partial", "failed"];

/// Constraint on one field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Str {
        min_len: Option<usize>,
        max_len: Option<usize>,
        allowed: Option<&'static [&'static str]>,
    },
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Bool,
    /// Array of non-empty strings.
    StrArray { min_items: Option<usize> },
    Object,
}

/// One named field rule.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// The rule record for one tool.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub tool: ToolName,
    pub required: &'static [&'static str],
    pub fields: Vec<FieldRule>,
    pub additional_properties: bool,
}

impl ToolSchema {
    /// Validates `args`, returning one message per violation.
    pub fn validate(&self, args: &Value) -> Vec<String> {
        let mut violations = Vec::new();

        let Some(map) = args.as_object() else {
            return vec!["arguments must be an object".to_string()];
        };

        for required in self.required {
            if !map.contains_key(*required) || map[*required].is_null() {
                violations.push(format!("{required} is required"));
            }
        }

        for (name, value) in map {
            let Some(rule) = self.fields.iter().find(|f| f.name == name) else {
                if !self.additional_properties {
                    violations.push(format!("unexpected field '{name}'"));
                }
                continue;
            };
            if value.is_null() {
                continue;
            }
            self.check_field(rule, value, &mut violations);
        }

        violations
    }

    fn check_field(&self, rule: &FieldRule, value: &Value, violations: &mut Vec<String>) {
        let name = rule.name;
        match &rule.kind {
            FieldKind::Str {
                min_len,
                max_len,
                allowed,
            } => {
                let Some(s) = value.as_str() else {
                    violations.push(format!("{name} must be a string"));
                    return;
                };
                if let Some(min) = min_len {
                    if s.chars().count() < *min {
                        violations.push(format!("{name} must be at least {min} characters"));
                    }
                }
                if let Some(max) = max_len {
                    if s.chars().count() > *max {
                        violations.push(format!("{name} must be at most {max} characters"));
                    }
                }
                if let Some(allowed) = allowed {
                    if !allowed.contains(&s) {
                        violations.push(format!(
                            "{name} must be one of {}",
                            allowed.join(", ")
                        ));
                    }
                }
            }
            FieldKind::Int { min, max } => {
                let Some(n) = value.as_i64() else {
                    violations.push(format!("{name} must be an integer"));
                    return;
                };
                if let Some(min) = min {
                    if n < *min {
                        violations.push(format!("{name} must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        violations.push(format!("{name} must be at most {max}"));
                    }
                }
            }
            FieldKind::Bool => {
                if !value.is_boolean() {
                    violations.push(format!("{name} must be a boolean"));
                }
            }
            FieldKind::StrArray { min_items } => {
                let Some(items) = value.as_array() else {
                    violations.push(format!("{name} must be an array of strings"));
                    return;
                };
                if let Some(min) = min_items {
                    if items.len() < *min {
                        violations.push(format!("{name} must contain at least {min} item(s)"));
                    }
                }
                if items.iter().any(|item| !item.is_string()) {
                    violations.push(format!("{name} must contain only strings"));
                }
            }
            FieldKind::Object => {
                if !value.is_object() {
                    violations.push(format!("{name} must be an object"));
                }
            }
        }
    }

    /// JSON-schema rendering for the tool catalog.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for rule in &self.fields {
            let mut prop = serde_json::Map::new();
            prop.insert("description".into(), rule.description.into());
            match &rule.kind {
                FieldKind::Str {
                    min_len,
                    max_len,
                    allowed,
                } => {
                    prop.insert("type".into(), "string".into());
                    if let Some(min) = min_len {
                        prop.insert("minLength".into(), (*min).into());
                    }
                    if let Some(max) = max_len {
                        prop.insert("maxLength".into(), (*max).into());
                    }
                    if let Some(allowed) = allowed {
                        prop.insert(
                            "enum".into(),
                            Value::Array(allowed.iter().map(|v| (*v).into()).collect()),
                        );
                    }
                }
                FieldKind::Int { min, max } => {
                    prop.insert("type".into(), "integer".into());
                    if let Some(min) = min {
                        prop.insert("minimum".into(), (*min).into());
                    }
                    if let Some(max) = max {
                        prop.insert("maximum".into(), (*max).into());
                    }
                }
                FieldKind::Bool => {
                    prop.insert("type".into(), "boolean".into());
                }
                FieldKind::StrArray { min_items } => {
                    prop.insert("type".into(), "array".into());
                    prop.insert("items".into(), serde_json::json!({"type": "string"}));
                    if let Some(min) = min_items {
                        prop.insert("minItems".into(), (*min).into());
                    }
                }
                FieldKind::Object => {
                    prop.insert("type".into(), "object".into());
                }
            }
            properties.insert(rule.name.to_string(), Value::Object(prop));
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
            "additionalProperties": self.additional_properties,
        })
    }
}

/// The rule record for `tool`.
pub fn schema_for(tool: ToolName) -> ToolSchema {
    match tool {
        ToolName::SearchRunbooks => ToolSchema {
            tool,
            required: &["alert_type", "severity", "affected_systems"],
            fields: vec![
                FieldRule {
                    name: "alert_type",
                    kind: FieldKind::Str {
                        min_len: Some(1),
                        max_len: Some(100),
                        allowed: None,
                    },
                    description: "Alert classifier, e.g. disk_full",
                },
                FieldRule {
                    name: "severity",
                    kind: FieldKind::Str {
                        min_len: None,
                        max_len: None,
                        allowed: Some(SEVERITIES),
                    },
                    description: "Incident severity",
                },
                FieldRule {
                    name: "affected_systems",
                    kind: FieldKind::StrArray { min_items: Some(1) },
                    description: "Systems showing the alert",
                },
                FieldRule {
                    name: "error_message",
                    kind: FieldKind::Str {
                        min_len: None,
                        max_len: Some(1000),
                        allowed: None,
                    },
                    description: "Raw error text, if available",
                },
                FieldRule {
                    name: "max_results",
                    kind: FieldKind::Int {
                        min: Some(1),
                        max: Some(100),
                    },
                    description: "Maximum number of runbooks to return",
                },
                FieldRule {
                    name: "context",
                    kind: FieldKind::Object,
                    description: "Free-form incident context",
                },
            ],
            additional_properties: false,
        },
        ToolName::SearchKnowledgeBase => ToolSchema {
            tool,
            required: &["query"],
            fields: vec![
                FieldRule {
                    name: "query",
                    kind: FieldKind::Str {
                        min_len: Some(2),
                        max_len: Some(500),
                        allowed: None,
                    },
                    description: "Free-text search query",
                },
                FieldRule {
                    name: "categories",
                    kind: FieldKind::StrArray { min_items: None },
                    description: "Restrict to these categories",
                },
                FieldRule {
                    name: "max_results",
                    kind: FieldKind::Int {
                        min: Some(1),
                        max: Some(100),
                    },
                    description: "Maximum number of results to return",
                },
                FieldRule {
                    name: "context",
                    kind: FieldKind::Object,
                    description: "Caller context (user agent, session)",
                },
            ],
            additional_properties: false,
        },
        ToolName::GetProcedure => ToolSchema {
            tool,
            required: &["procedure_id"],
            fields: vec![
                FieldRule {
                    name: "procedure_id",
                    kind: FieldKind::Str {
                        min_len: Some(1),
                        max_len: Some(200),
                        allowed: None,
                    },
                    description: "Procedure identifier",
                },
                FieldRule {
                    name: "section",
                    kind: FieldKind::Str {
                        min_len: None,
                        max_len: Some(100),
                        allowed: None,
                    },
                    description: "Restrict to one section",
                },
            ],
            additional_properties: false,
        },
        ToolName::GetDecisionTree => ToolSchema {
            tool,
            required: &["alert_type"],
            fields: vec![
                FieldRule {
                    name: "alert_type",
                    kind: FieldKind::Str {
                        min_len: Some(1),
                        max_len: Some(100),
                        allowed: None,
                    },
                    description: "Alert classifier to resolve decision logic for",
                },
                FieldRule {
                    name: "severity",
                    kind: FieldKind::Str {
                        min_len: None,
                        max_len: None,
                        allowed: Some(SEVERITIES),
                    },
                    description: "Incident severity, when known",
                },
                FieldRule {
                    name: "context",
                    kind: FieldKind::Object,
                    description: "Free-form incident context",
                },
            ],
            additional_properties: false,
        },
        ToolName::GetEscalationPath => ToolSchema {
            tool,
            required: &["severity", "business_hours"],
            fields: vec![
                FieldRule {
                    name: "severity",
                    kind: FieldKind::Str {
                        min_len: None,
                        max_len: None,
                        allowed: Some(SEVERITIES),
                    },
                    description: "Incident severity",
                },
                FieldRule {
                    name: "business_hours",
                    kind: FieldKind::Bool,
                    description: "Whether the incident falls in business hours",
                },
                FieldRule {
                    name: "failed_attempts",
                    kind: FieldKind::Int {
                        min: Some(0),
                        max: Some(10),
                    },
                    description: "Resolution attempts already made",
                },
            ],
            additional_properties: false,
        },
        ToolName::ListSources => ToolSchema {
            tool,
            required: &[],
            fields: vec![FieldRule {
                name: "include_health",
                kind: FieldKind::Bool,
                description: "Include a live health probe per source",
            }],
            additional_properties: false,
        },
        ToolName::RecordResolutionFeedback => ToolSchema {
            tool,
            required: &["runbook_id", "outcome"],
            fields: vec![
                FieldRule {
                    name: "runbook_id",
                    kind: FieldKind::Str {
                        min_len: Some(1),
                        max_len: Some(200),
                        allowed: None,
                    },
                    description: "Runbook the feedback refers to",
                },
                FieldRule {
                    name: "outcome",
                    kind: FieldKind::Str {
                        min_len: None,
                        max_len: None,
                        allowed: Some(FEEDBACK_OUTCOMES),
                    },
                    description: "How the resolution attempt ended",
                },
                FieldRule {
                    name: "resolution_time_minutes",
                    kind: FieldKind::Int {
                        min: Some(0),
                        max: Some(100_000),
                    },
                    description: "Minutes from alert to resolution",
                },
                FieldRule {
                    name: "notes",
                    kind: FieldKind::Str {
                        min_len: None,
                        max_len: Some(2000),
                        allowed: None,
                    },
                    description: "Free-text notes",
                },
                FieldRule {
                    name: "context",
                    kind: FieldKind::Object,
                    description: "Free-form context",
                },
            ],
            additional_properties: false,
        },
    }
}

/// Parses the severity field after validation has accepted it.
pub fn severity_from(args: &Value, field: &str) -> Option<Severity> {
    args.get(field)?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_query_reports_minimum_length() {
        let schema = schema_for(ToolName::SearchKnowledgeBase);
        let violations = schema.validate(&json!({"query": "a"}));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("at least 2 characters"));
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let schema = schema_for(ToolName::SearchRunbooks);
        let violations = schema.validate(&json!({"alert_type": "disk_full"}));
        assert!(violations.iter().any(|v| v == "severity is required"));
        assert!(violations
            .iter()
            .any(|v| v == "affected_systems is required"));
    }

    #[test]
    fn severity_enum_is_enforced() {
        let schema = schema_for(ToolName::SearchRunbooks);
        let violations = schema.validate(&json!({
            "alert_type": "disk_full",
            "severity": "urgent",
            "affected_systems": ["db"],
        }));
        assert!(violations.iter().any(|v| v.contains("must be one of")));
    }

    #[test]
    fn unexpected_fields_are_rejected() {
        let schema = schema_for(ToolName::GetEscalationPath);
        let violations = schema.validate(&json!({
            "severity": "high",
            "business_hours": true,
            "page_everyone": true,
        }));
        assert!(violations
            .iter()
            .any(|v| v.contains("unexpected field 'page_everyone'")));
    }

    #[test]
    fn valid_runbook_search_passes() {
        let schema = schema_for(ToolName::SearchRunbooks);
        let violations = schema.validate(&json!({
            "alert_type": "disk_full",
            "severity": "critical",
            "affected_systems": ["production", "database"],
        }));
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn type_mismatches_are_reported() {
        let schema = schema_for(ToolName::GetEscalationPath);
        let violations = schema.validate(&json!({
            "severity": "high",
            "business_hours": "yes",
            "failed_attempts": 99,
        }));
        assert!(violations.iter().any(|v| v.contains("must be a boolean")));
        assert!(violations.iter().any(|v| v.contains("at most 10")));
    }

    #[test]
    fn json_schema_rendering_is_complete() {
        let schema = schema_for(ToolName::SearchKnowledgeBase);
        let rendered = schema.to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["query"]["minLength"], 2);
        assert_eq!(rendered["required"][0], "query");
        assert_eq!(rendered["additionalProperties"], false);
    }
}
