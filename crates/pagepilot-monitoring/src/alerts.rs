//! Alert lifecycle.

use chrono::{DateTime, Utc};
use pagepilot_core::Severity;
use serde::Serialize;
use uuid::Uuid;

/// One raised alert.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Component that triggered the rule.
    pub source: String,
    pub raised_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Snapshot of the metrics that triggered the rule.
    pub context_metrics: serde_json::Value,
}

impl Alert {
    /// Creates an unresolved alert with a fresh id.
    pub fn raise(
        rule_id: &str,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        context_metrics: serde_json::Value,
    ) -> Self {
        Alert {
            id: Uuid::new_v4().to_string(),
            rule_id: rule_id.to_string(),
            severity,
            title: title.into(),
            description: description.into(),
            source: source.into(),
            raised_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            context_metrics,
        }
    }

    /// Marks the alert resolved now.
    pub fn resolve(&mut self) {
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }
}

/// Compact alert view for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AlertView {
    pub id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub title: String,
    pub raised_at: DateTime<Utc>,
    pub resolved: bool,
}

impl From<&Alert> for AlertView {
    fn from(alert: &Alert) -> Self {
        AlertView {
            id: alert.id.clone(),
            rule_id: alert.rule_id.clone(),
            severity: alert.severity,
            title: alert.title.clone(),
            raised_at: alert.raised_at,
            resolved: alert.resolved,
        }
    }
}
