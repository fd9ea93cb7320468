//! Rule-based alerting.
//!
//! A [`MonitoringService`] evaluates an ordered rule set against one metrics
//! snapshot per tick. Rules fire alerts after their cooldown has elapsed,
//! auto-resolve when the predicate clears, and fan notifications out to the
//! configured sinks. The snapshot is assembled by the server through the
//! [`MetricsSource`] trait, so this crate never depends on the components it
//! watches.

mod alerts;
mod notify;
mod rules;
mod service;
mod snapshot;

pub use alerts::{Alert, AlertView};
pub use notify::{ConsoleSink, NotificationSink, WebhookSink};
pub use rules::{default_rules, MonitoringRule, RuleView};
pub use service::{MonitoringConfig, MonitoringService, MonitoringStatus};
pub use snapshot::{MetricsSnapshot, MetricsSource};
