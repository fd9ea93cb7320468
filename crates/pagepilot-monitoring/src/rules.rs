//! Monitoring rules.

use crate::snapshot::MetricsSnapshot;
use pagepilot_core::Severity;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Predicate evaluated against each snapshot.
pub type RulePredicate = Arc<dyn Fn(&MetricsSnapshot) -> bool + Send + Sync>;

/// One monitoring rule. A rule fires at most once per cooldown window and
/// holds at most one active alert.
#[derive(Clone)]
pub struct MonitoringRule {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub predicate: RulePredicate,
    pub cooldown: Duration,
    pub enabled: bool,
}

impl MonitoringRule {
    /// Creates an enabled rule.
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        cooldown: Duration,
        predicate: impl Fn(&MetricsSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        MonitoringRule {
            id: id.into(),
            severity,
            title: title.into(),
            description: description.into(),
            predicate: Arc::new(predicate),
            cooldown,
            enabled: true,
        }
    }
}

impl std::fmt::Debug for MonitoringRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringRule")
            .field("id", &self.id)
            .field("severity", &self.severity)
            .field("cooldown", &self.cooldown)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Serializable rule view for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub cooldown_ms: u64,
    pub enabled: bool,
}

impl From<&MonitoringRule> for RuleView {
    fn from(rule: &MonitoringRule) -> Self {
        RuleView {
            id: rule.id.clone(),
            severity: rule.severity,
            title: rule.title.clone(),
            cooldown_ms: rule.cooldown.as_millis() as u64,
            enabled: rule.enabled,
        }
    }
}

/// The built-in rule set.
pub fn default_rules() -> Vec<MonitoringRule> {
    vec![
        MonitoringRule::new(
            "system_down",
            Severity::Critical,
            "Server unhealthy",
            "The server health flag is down",
            Duration::from_secs(60),
            |m| !m.server_healthy,
        ),
        MonitoringRule::new(
            "cache_down",
            Severity::Critical,
            "Cache unavailable",
            "Both the local and remote cache tiers are unhealthy",
            Duration::from_secs(300),
            |m| !m.cache_local_healthy && !m.cache_remote_healthy,
        ),
        MonitoringRule::new(
            "high_response_time",
            Severity::High,
            "High response time",
            "p95 response time above 2000ms",
            Duration::from_secs(300),
            |m| m.p95_response_ms > 2000.0,
        ),
        MonitoringRule::new(
            "high_memory_usage",
            Severity::High,
            "High memory usage",
            "Resident memory above 2048 MB",
            Duration::from_secs(600),
            |m| m.memory_rss_mb > 2048.0,
        ),
        MonitoringRule::new(
            "high_error_rate",
            Severity::High,
            "High error rate",
            "Error rate above 10%",
            Duration::from_secs(300),
            |m| m.error_rate > 0.10,
        ),
        MonitoringRule::new(
            "low_cache_hit_rate",
            Severity::Medium,
            "Low cache hit rate",
            "Cache hit rate below 50%",
            Duration::from_secs(900),
            |m| m.cache_total_ops > 0 && m.cache_hit_rate < 0.5,
        ),
        MonitoringRule::new(
            "source_adapters_degraded",
            Severity::Medium,
            "Source adapters degraded",
            "Fewer than half of the source adapters are healthy",
            Duration::from_secs(600),
            |m| m.adapters_total > 0 && m.adapters_healthy_pct() < 50.0,
        ),
        MonitoringRule::new(
            "low_throughput",
            Severity::Medium,
            "Low throughput",
            "Request rate below 1 rps while traffic is flowing",
            Duration::from_secs(900),
            |m| m.requests_per_second > 0.0 && m.requests_per_second < 1.0,
        ),
        MonitoringRule::new(
            "redis_connection_issues",
            Severity::Low,
            "Remote cache disconnected",
            "The remote cache is enabled but not connected",
            Duration::from_secs(1800),
            |m| m.cache_remote_enabled && !m.cache_remote_connected,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(rules: &[MonitoringRule], id: &str) -> MonitoringRule {
        rules.iter().find(|r| r.id == id).expect("rule exists").clone()
    }

    #[test]
    fn default_set_has_nine_rules() {
        assert_eq!(default_rules().len(), 9);
    }

    #[test]
    fn system_down_fires_on_unhealthy_server() {
        let rules = default_rules();
        let r = rule(&rules, "system_down");
        let mut snap = MetricsSnapshot::default();
        assert!(!(r.predicate)(&snap));
        snap.server_healthy = false;
        assert!((r.predicate)(&snap));
    }

    #[test]
    fn hit_rate_rule_ignores_idle_cache() {
        let rules = default_rules();
        let r = rule(&rules, "low_cache_hit_rate");
        let mut snap = MetricsSnapshot {
            cache_hit_rate: 0.0,
            cache_total_ops: 0,
            ..MetricsSnapshot::default()
        };
        assert!(!(r.predicate)(&snap));
        snap.cache_total_ops = 25;
        assert!((r.predicate)(&snap));
    }

    #[test]
    fn adapter_rule_uses_percentage() {
        let rules = default_rules();
        let r = rule(&rules, "source_adapters_degraded");
        let snap = MetricsSnapshot {
            adapters_total: 4,
            adapters_healthy: 1,
            ..MetricsSnapshot::default()
        };
        assert!((r.predicate)(&snap));
        let snap = MetricsSnapshot {
            adapters_total: 4,
            adapters_healthy: 2,
            ..MetricsSnapshot::default()
        };
        assert!(!(r.predicate)(&snap));
    }

    #[test]
    fn low_throughput_requires_some_traffic() {
        let rules = default_rules();
        let r = rule(&rules, "low_throughput");
        let mut snap = MetricsSnapshot::default();
        assert!(!(r.predicate)(&snap));
        snap.requests_per_second = 0.4;
        assert!((r.predicate)(&snap));
        snap.requests_per_second = 3.0;
        assert!(!(r.predicate)(&snap));
    }
}
