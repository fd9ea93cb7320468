//! The circuit breaker state machine.

use crate::config::BreakerConfig;
use crate::error::BreakerError;
use crate::events::BreakerEvent;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// State of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls pass through; failures accumulate in the window.
    #[serde(rename = "CLOSED")]
    Closed = 0,
    /// Calls fast-fail until the recovery timeout elapses.
    #[serde(rename = "OPEN")]
    Open = 1,
    /// Probe calls run; successes close, any failure re-opens.
    #[serde(rename = "HALF_OPEN")]
    HalfOpen = 2,
}

impl CircuitState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker, serializable for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Failures currently inside the monitoring window.
    pub failures_in_window: usize,
    pub half_open_successes: usize,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_fallbacks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    /// Milliseconds until the next half-open probe is admitted, when open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_in_ms: Option<u64>,
}

struct CircuitCore {
    state: CircuitState,
    failures: VecDeque<Instant>,
    half_open_successes: usize,
    total_successes: u64,
    total_failures: u64,
    total_fallbacks: u64,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    next_retry_at: Option<Instant>,
}

impl CircuitCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            half_open_successes: 0,
            total_successes: 0,
            total_failures: 0,
            total_fallbacks: 0,
            last_success: None,
            last_failure: None,
            next_retry_at: None,
        }
    }

    fn prune_window(&mut self, window: Duration, now: Instant) {
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Moves to `state`, resetting the counters the target state requires.
    /// Returns the transition for event emission, or None when already there.
    fn transition_to(
        &mut self,
        state: CircuitState,
        config: &BreakerConfig,
        now: Instant,
    ) -> Option<(CircuitState, CircuitState)> {
        if self.state == state {
            return None;
        }
        let from = self.state;
        match state {
            CircuitState::Closed => {
                self.failures.clear();
                self.half_open_successes = 0;
                self.next_retry_at = None;
            }
            CircuitState::Open => {
                self.next_retry_at = Some(now + config.recovery_timeout);
            }
            CircuitState::HalfOpen => {
                self.half_open_successes = 0;
            }
        }
        self.state = state;
        Some((from, state))
    }
}

/// A three-state circuit breaker guarding one dependency.
///
/// State transitions are linearizable per breaker: admission decisions and
/// outcome recording each run under the internal lock, while the guarded
/// future itself runs outside it.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<CircuitCore>,
}

impl CircuitBreaker {
    /// Creates a breaker from the given configuration.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitCore::new()),
        }
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state. Open circuits flip to half-open only when a call is
    /// admitted, so this reports the raw state without side effects.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Runs `f` under the breaker.
    ///
    /// Open circuits fast-fail with [`BreakerError::CircuitOpen`] without
    /// invoking `f`. Calls that outlive the configured timeout count as
    /// failures and their futures are dropped, never retried.
    pub async fn execute<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let now = Instant::now();
        let admitted = {
            let mut core = self.inner.lock().expect("breaker lock poisoned");
            match core.state {
                CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
                CircuitState::Open => {
                    let retry_at = core.next_retry_at.unwrap_or(now);
                    if now >= retry_at {
                        let transition =
                            core.transition_to(CircuitState::HalfOpen, &self.config, now);
                        drop(core);
                        self.emit_transition(transition);
                        Ok(())
                    } else {
                        core.total_fallbacks += 1;
                        Err(retry_at.duration_since(now))
                    }
                }
            }
        };

        if let Err(retry_after) = admitted {
            self.emit(BreakerEvent::FallbackTriggered {
                breaker: self.config.name.clone(),
                at: now,
            });
            counter!("breaker_fallbacks_total", "breaker" => self.config.name.clone())
                .increment(1);
            return Err(BreakerError::CircuitOpen {
                name: self.config.name.clone(),
                retry_after,
            });
        }

        match tokio::time::timeout(self.config.call_timeout, f()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure(error.to_string());
                Err(BreakerError::Inner(error))
            }
            Err(_) => {
                self.record_failure(format!(
                    "call exceeded {}ms timeout",
                    self.config.call_timeout.as_millis()
                ));
                Err(BreakerError::Timeout {
                    name: self.config.name.clone(),
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    /// Forces the circuit closed and clears the failure window.
    pub fn reset(&self) {
        let transition = {
            let mut core = self.inner.lock().expect("breaker lock poisoned");
            core.transition_to(CircuitState::Closed, &self.config, Instant::now())
        };
        self.emit_transition(transition);
    }

    /// Serializable snapshot of the breaker's state and totals.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let mut core = self.inner.lock().expect("breaker lock poisoned");
        core.prune_window(self.config.monitoring_window, now);
        BreakerSnapshot {
            name: self.config.name.clone(),
            state: core.state,
            failures_in_window: core.failures.len(),
            half_open_successes: core.half_open_successes,
            total_successes: core.total_successes,
            total_failures: core.total_failures,
            total_fallbacks: core.total_fallbacks,
            last_success: core.last_success,
            last_failure: core.last_failure,
            next_retry_in_ms: core.next_retry_at.map(|at| {
                at.saturating_duration_since(now).as_millis() as u64
            }),
        }
    }

    fn record_success(&self) {
        let now = Instant::now();
        let transition = {
            let mut core = self.inner.lock().expect("breaker lock poisoned");
            core.total_successes += 1;
            core.last_success = Some(Utc::now());
            match core.state {
                CircuitState::Closed => {
                    core.failures.clear();
                    None
                }
                CircuitState::HalfOpen => {
                    core.half_open_successes += 1;
                    if core.half_open_successes >= self.config.success_threshold {
                        core.transition_to(CircuitState::Closed, &self.config, now)
                    } else {
                        None
                    }
                }
                CircuitState::Open => None,
            }
        };
        self.emit_transition(transition);
        self.emit(BreakerEvent::SuccessRecorded {
            breaker: self.config.name.clone(),
            at: now,
        });
        counter!("breaker_calls_total", "breaker" => self.config.name.clone(), "outcome" => "success")
            .increment(1);
    }

    fn record_failure(&self, error: String) {
        let now = Instant::now();
        let transition = {
            let mut core = self.inner.lock().expect("breaker lock poisoned");
            core.total_failures += 1;
            core.last_failure = Some(Utc::now());
            core.failures.push_back(now);
            core.prune_window(self.config.monitoring_window, now);
            match core.state {
                CircuitState::Closed => {
                    if core.failures.len() >= self.config.failure_threshold {
                        core.transition_to(CircuitState::Open, &self.config, now)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => core.transition_to(CircuitState::Open, &self.config, now),
                CircuitState::Open => None,
            }
        };
        self.emit_transition(transition);
        self.emit(BreakerEvent::FailureRecorded {
            breaker: self.config.name.clone(),
            at: now,
            error,
        });
        counter!("breaker_calls_total", "breaker" => self.config.name.clone(), "outcome" => "failure")
            .increment(1);
    }

    fn emit_transition(&self, transition: Option<(CircuitState, CircuitState)>) {
        if let Some((from, to)) = transition {
            tracing::info!(
                breaker = %self.config.name,
                from = %from,
                to = %to,
                "circuit state transition"
            );
            counter!(
                "breaker_transitions_total",
                "breaker" => self.config.name.clone(),
                "from" => from.as_str(),
                "to" => to.as_str()
            )
            .increment(1);
            gauge!("breaker_state", "breaker" => self.config.name.clone()).set(to as u8 as f64);
            self.emit(BreakerEvent::StateTransition {
                breaker: self.config.name.clone(),
                at: Instant::now(),
                from,
                to,
            });
        }
    }

    fn emit(&self, event: BreakerEvent) {
        self.config.event_listeners.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quick_breaker(failure_threshold: usize, success_threshold: usize) -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerConfig::builder()
                .name("unit")
                .failure_threshold(failure_threshold)
                .success_threshold(success_threshold)
                .monitoring_window(Duration::from_secs(10))
                .recovery_timeout(Duration::from_millis(100))
                .call_timeout(Duration::from_millis(500))
                .build(),
        )
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = quick_breaker(3, 2);
        for _ in 0..3 {
            let _ = breaker
                .execute(|| async { Err::<(), _>("boom") })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_fast_fails_without_invoking() {
        let breaker = quick_breaker(2, 1);
        for _ in 0..2 {
            let _ = breaker
                .execute(|| async { Err::<(), _>("boom") })
                .await;
        }

        let invoked = Arc::new(AtomicUsize::new(0));
        let i = Arc::clone(&invoked);
        let result = breaker
            .execute(move || async move {
                i.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recovers_through_half_open() {
        let breaker = quick_breaker(3, 2);
        for _ in 0..3 {
            let _ = breaker
                .execute(|| async { Err::<(), _>("boom") })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        for _ in 0..2 {
            breaker
                .execute(|| async { Ok::<_, String>(()) })
                .await
                .unwrap();
        }

        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.total_failures, 3);
        assert_eq!(snap.total_successes, 2);
        assert_eq!(snap.failures_in_window, 0);
        assert_eq!(snap.half_open_successes, 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = quick_breaker(2, 2);
        for _ in 0..2 {
            let _ = breaker
                .execute(|| async { Err::<(), _>("boom") })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let _ = breaker
            .execute(|| async { Err::<(), _>("still broken") })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.snapshot().next_retry_in_ms.is_some());
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(
            BreakerConfig::builder()
                .name("slow")
                .failure_threshold(1)
                .call_timeout(Duration::from_millis(20))
                .build(),
        );

        let result = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Timeout { .. })));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn success_clears_failure_window() {
        let breaker = quick_breaker(3, 1);
        for _ in 0..2 {
            let _ = breaker
                .execute(|| async { Err::<(), _>("boom") })
                .await;
        }
        breaker
            .execute(|| async { Ok::<_, String>(()) })
            .await
            .unwrap();
        assert_eq!(breaker.snapshot().failures_in_window, 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_closes_and_clears() {
        let breaker = quick_breaker(1, 1);
        let _ = breaker
            .execute(|| async { Err::<(), _>("boom") })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.snapshot().next_retry_in_ms.is_none());
    }

    #[tokio::test]
    async fn state_change_listener_fires() {
        let transitions = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&transitions);
        let breaker = CircuitBreaker::new(
            BreakerConfig::builder()
                .name("listened")
                .failure_threshold(1)
                .on_state_change(move |_, _| {
                    t.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        );

        let _ = breaker
            .execute(|| async { Err::<(), _>("boom") })
            .await;
        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }
}
