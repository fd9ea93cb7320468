//! The evaluation loop and alert bookkeeping.

use crate::alerts::{Alert, AlertView};
use crate::notify::NotificationSink;
use crate::rules::{default_rules, MonitoringRule, RuleView};
use crate::snapshot::{MetricsSnapshot, MetricsSource};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monitoring settings.
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub check_interval: Duration,
    pub max_active_alerts: usize,
    pub alert_retention_hours: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            enabled: true,
            check_interval: Duration::from_secs(30),
            max_active_alerts: 50,
            alert_retention_hours: 24,
        }
    }
}

/// Serializable status for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStatus {
    pub enabled: bool,
    pub running: bool,
    pub active_alerts: usize,
    pub history_size: usize,
    pub rules: Vec<RuleView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

struct Inner {
    rules: Vec<MonitoringRule>,
    /// Active alerts keyed by alert id.
    active: HashMap<String, Alert>,
    /// Rule id → active alert id; a rule holds at most one active alert.
    by_rule: HashMap<String, String>,
    history: Vec<Alert>,
    last_fired: HashMap<String, Instant>,
    last_check: Option<DateTime<Utc>>,
}

/// Rule-driven alerting service.
pub struct MonitoringService {
    config: MonitoringConfig,
    inner: Mutex<Inner>,
    sinks: Mutex<Vec<Arc<dyn NotificationSink>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MonitoringService {
    /// Creates a service carrying the built-in rule set.
    pub fn new(config: MonitoringConfig) -> Self {
        Self::with_rules(config, default_rules())
    }

    /// Creates a service with an explicit rule set.
    pub fn with_rules(config: MonitoringConfig, rules: Vec<MonitoringRule>) -> Self {
        MonitoringService {
            config,
            inner: Mutex::new(Inner {
                rules,
                active: HashMap::new(),
                by_rule: HashMap::new(),
                history: Vec::new(),
                last_fired: HashMap::new(),
                last_check: None,
            }),
            sinks: Mutex::new(Vec::new()),
            task: Mutex::new(None),
        }
    }

    /// Registers a notification sink.
    pub fn add_sink(&self, sink: Arc<dyn NotificationSink>) {
        self.sinks.lock().expect("sinks poisoned").push(sink);
    }

    /// Adds a rule at runtime.
    pub fn add_rule(&self, rule: MonitoringRule) {
        self.inner.lock().expect("monitoring poisoned").rules.push(rule);
    }

    /// Starts the periodic evaluation loop against `source`.
    pub fn start(self: Arc<Self>, source: Arc<dyn MetricsSource>) {
        if !self.config.enabled {
            tracing::info!("monitoring disabled; evaluation loop not started");
            return;
        }
        let service = Arc::clone(&self);
        let interval = self.config.check_interval;
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let snapshot = source.snapshot().await;
                service.evaluate(&snapshot);
            }
        });
        if let Some(previous) = self.task.lock().expect("task poisoned").replace(task) {
            previous.abort();
        }
        tracing::info!(interval_ms = interval.as_millis() as u64, "monitoring started");
    }

    /// Stops the evaluation loop.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().expect("task poisoned").take() {
            task.abort();
            tracing::info!("monitoring stopped");
        }
    }

    /// Evaluates every enabled rule against one snapshot. Raise and
    /// auto-resolve for the same rule are mutually exclusive within a tick.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) {
        let now = Instant::now();
        let mut raised: Vec<Alert> = Vec::new();
        let mut resolved: Vec<Alert> = Vec::new();

        {
            let mut inner = self.inner.lock().expect("monitoring poisoned");
            inner.last_check = Some(Utc::now());
            let rules: Vec<MonitoringRule> =
                inner.rules.iter().filter(|r| r.enabled).cloned().collect();

            for rule in rules {
                let firing = (rule.predicate)(snapshot);
                if firing {
                    let cooled = inner
                        .last_fired
                        .get(&rule.id)
                        .map(|at| now.duration_since(*at) > rule.cooldown)
                        .unwrap_or(true);
                    if !cooled {
                        continue;
                    }
                    if inner.active.len() >= self.config.max_active_alerts
                        && !inner.by_rule.contains_key(&rule.id)
                    {
                        tracing::warn!(
                            rule = %rule.id,
                            cap = self.config.max_active_alerts,
                            "active alert cap reached; skipping raise"
                        );
                        continue;
                    }

                    // A re-fire after cooldown supersedes the rule's previous
                    // active alert so the one-active-per-rule invariant holds.
                    if let Some(old_id) = inner.by_rule.remove(&rule.id) {
                        inner.active.remove(&old_id);
                    }

                    let alert = Alert::raise(
                        &rule.id,
                        rule.severity,
                        rule.title.clone(),
                        rule.description.clone(),
                        "monitoring",
                        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
                    );
                    inner.last_fired.insert(rule.id.clone(), now);
                    inner.by_rule.insert(rule.id.clone(), alert.id.clone());
                    inner.active.insert(alert.id.clone(), alert.clone());
                    inner.history.push(alert.clone());
                    raised.push(alert);
                } else if let Some(alert_id) = inner.by_rule.remove(&rule.id) {
                    if let Some(mut alert) = inner.active.remove(&alert_id) {
                        alert.resolve();
                        if let Some(entry) =
                            inner.history.iter_mut().find(|a| a.id == alert.id)
                        {
                            entry.resolved = true;
                            entry.resolved_at = alert.resolved_at;
                        }
                        resolved.push(alert);
                    }
                }
            }

            self.prune(&mut inner);
        }

        for alert in &raised {
            tracing::warn!(
                rule = %alert.rule_id,
                severity = %alert.severity,
                alert_id = %alert.id,
                "alert raised: {}",
                alert.title
            );
            self.fan_out(alert, false);
        }
        for alert in &resolved {
            tracing::info!(rule = %alert.rule_id, alert_id = %alert.id, "alert auto-resolved");
            self.fan_out(alert, true);
        }
    }

    /// Manually resolves an active alert by id. Returns false when unknown.
    pub fn resolve(&self, alert_id: &str) -> bool {
        let resolved = {
            let mut inner = self.inner.lock().expect("monitoring poisoned");
            match inner.active.remove(alert_id) {
                Some(mut alert) => {
                    alert.resolve();
                    inner.by_rule.retain(|_, id| id != alert_id);
                    if let Some(entry) = inner.history.iter_mut().find(|a| a.id == alert_id) {
                        entry.resolved = true;
                        entry.resolved_at = alert.resolved_at;
                    }
                    Some(alert)
                }
                None => None,
            }
        };
        match resolved {
            Some(alert) => {
                self.fan_out(&alert, true);
                true
            }
            None => false,
        }
    }

    /// Currently active alerts, newest first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        let inner = self.inner.lock().expect("monitoring poisoned");
        let mut alerts: Vec<Alert> = inner.active.values().cloned().collect();
        alerts.sort_by(|a, b| b.raised_at.cmp(&a.raised_at));
        alerts
    }

    /// Time-ordered alert history (oldest first).
    pub fn history(&self) -> Vec<AlertView> {
        let inner = self.inner.lock().expect("monitoring poisoned");
        inner.history.iter().map(AlertView::from).collect()
    }

    /// Status rollup for the admin surface.
    pub fn status(&self) -> MonitoringStatus {
        let inner = self.inner.lock().expect("monitoring poisoned");
        MonitoringStatus {
            enabled: self.config.enabled,
            running: self
                .task
                .lock()
                .expect("task poisoned")
                .as_ref()
                .map(|t| !t.is_finished())
                .unwrap_or(false),
            active_alerts: inner.active.len(),
            history_size: inner.history.len(),
            rules: inner.rules.iter().map(RuleView::from).collect(),
            last_check: inner.last_check,
        }
    }

    fn prune(&self, inner: &mut Inner) {
        let horizon = Utc::now() - ChronoDuration::hours(self.config.alert_retention_hours);
        inner.history.retain(|alert| alert.raised_at > horizon);
        let stale: Vec<String> = inner
            .active
            .values()
            .filter(|alert| alert.raised_at <= horizon)
            .map(|alert| alert.id.clone())
            .collect();
        for id in stale {
            if let Some(alert) = inner.active.remove(&id) {
                inner.by_rule.remove(&alert.rule_id);
            }
        }
    }

    fn fan_out(&self, alert: &Alert, is_resolution: bool) {
        let sinks = self.sinks.lock().expect("sinks poisoned").clone();
        for sink in sinks {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                if is_resolution {
                    sink.notify_resolved(alert);
                } else {
                    sink.notify(alert);
                }
            }));
            if outcome.is_err() {
                tracing::warn!(alert_id = %alert.id, "notification sink panicked");
            }
        }
    }
}
