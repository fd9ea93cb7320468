//! Notification sinks.

use crate::alerts::Alert;
use pagepilot_core::Severity;

/// A destination for alert notifications. Sinks run synchronously in
/// registration order; a panicking sink is caught by the service.
pub trait NotificationSink: Send + Sync {
    /// Called when an alert is raised.
    fn notify(&self, alert: &Alert);

    /// Called when an alert resolves. Default: nothing.
    fn notify_resolved(&self, _alert: &Alert) {}
}

/// Prints alerts to stdout with ANSI severity colors.
pub struct ConsoleSink;

fn color_for(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "\x1b[31m", // red
        Severity::High => "\x1b[33m",     // yellow
        Severity::Medium => "\x1b[36m",   // cyan
        Severity::Low | Severity::Info => "\x1b[37m", // white
    }
}

impl NotificationSink for ConsoleSink {
    fn notify(&self, alert: &Alert) {
        println!(
            "{}[{}] {}\x1b[0m {} ({})",
            color_for(alert.severity),
            alert.severity.as_str().to_uppercase(),
            alert.title,
            alert.description,
            alert.id
        );
    }

    fn notify_resolved(&self, alert: &Alert) {
        println!(
            "\x1b[32m[RESOLVED]\x1b[0m {} ({})",
            alert.title, alert.id
        );
    }
}

/// Builds the webhook JSON payload for each alert.
///
/// TODO: wire an HTTP client for delivery; the payload shape below is final
/// and the choice of client is still open.
pub struct WebhookSink {
    url: String,
}

impl WebhookSink {
    /// Creates a sink targeting `url`.
    pub fn new(url: impl Into<String>) -> Self {
        WebhookSink { url: url.into() }
    }

    /// The payload that will be POSTed once delivery is wired up.
    pub fn payload(&self, alert: &Alert) -> serde_json::Value {
        serde_json::json!({
            "alert_id": alert.id,
            "rule_id": alert.rule_id,
            "severity": alert.severity,
            "title": alert.title,
            "description": alert.description,
            "source": alert.source,
            "raised_at": alert.raised_at,
            "resolved": alert.resolved,
            "context": alert.context_metrics,
        })
    }
}

impl NotificationSink for WebhookSink {
    fn notify(&self, alert: &Alert) {
        let payload = self.payload(alert);
        tracing::info!(
            url = %self.url,
            alert_id = %alert.id,
            payload = %payload,
            "webhook notification prepared"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_payload_carries_alert_fields() {
        let alert = Alert::raise(
            "high_error_rate",
            Severity::High,
            "High error rate",
            "above 10%",
            "performance-monitor",
            serde_json::json!({"error_rate": 0.25}),
        );
        let sink = WebhookSink::new("https://hooks.example/pp");
        let payload = sink.payload(&alert);
        assert_eq!(payload["rule_id"], "high_error_rate");
        assert_eq!(payload["severity"], "high");
        assert_eq!(payload["context"]["error_rate"], 0.25);
        assert_eq!(payload["resolved"], false);
    }
}
