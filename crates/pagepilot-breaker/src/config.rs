//! Breaker configuration and builder.

use crate::events::BreakerEvent;
use crate::CircuitState;
use pagepilot_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for one circuit breaker.
pub struct BreakerConfig {
    pub(crate) name: String,
    pub(crate) failure_threshold: usize,
    pub(crate) monitoring_window: Duration,
    pub(crate) recovery_timeout: Duration,
    pub(crate) success_threshold: usize,
    pub(crate) call_timeout: Duration,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfig {
    /// Creates a configuration builder with the standard defaults.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    name: String,
    failure_threshold: usize,
    monitoring_window: Duration,
    recovery_timeout: Duration,
    success_threshold: usize,
    call_timeout: Duration,
    event_listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfigBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            failure_threshold: 5,
            monitoring_window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(300),
            success_threshold: 3,
            call_timeout: Duration::from_secs(30),
            event_listeners: EventListeners::new(),
        }
    }

    /// Human-readable breaker name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Number of failures inside the monitoring window that opens the circuit.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Width of the sliding failure window. Failures older than this are
    /// pruned and never count toward the threshold.
    ///
    /// Default: 60 seconds
    pub fn monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    /// How long the circuit stays open before the first half-open probe is
    /// admitted.
    ///
    /// Default: 5 minutes
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Consecutive half-open successes required to close the circuit.
    ///
    /// Default: 3
    pub fn success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Per-call timeout enforced by the breaker itself. A call that has not
    /// settled within this duration counts as a failure and is dropped.
    ///
    /// Default: 30 seconds
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Registers a callback for state transitions.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::StateTransition { from, to, .. } = event {
                    f(*from, *to);
                }
            }));
        self
    }

    /// Registers a callback for fast-fails while the circuit is open.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if matches!(event, BreakerEvent::FallbackTriggered { .. }) {
                    f();
                }
            }));
        self
    }

    /// Registers an arbitrary event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: pagepilot_core::EventListener<BreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BreakerConfig {
        BreakerConfig {
            name: self.name,
            failure_threshold: self.failure_threshold.max(1),
            monitoring_window: self.monitoring_window,
            recovery_timeout: self.recovery_timeout,
            success_threshold: self.success_threshold.max(1),
            call_timeout: self.call_timeout,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_service_class() {
        let config = BreakerConfig::builder().build();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.monitoring_window, Duration::from_secs(60));
        assert_eq!(config.recovery_timeout, Duration::from_secs(300));
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn thresholds_are_clamped_to_at_least_one() {
        let config = BreakerConfig::builder()
            .failure_threshold(0)
            .success_threshold(0)
            .build();
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.success_threshold, 1);
    }
}
