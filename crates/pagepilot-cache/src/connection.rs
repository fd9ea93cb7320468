//! Remote-cache connection lifecycle.
//!
//! The manager owns the single connection to the remote tier and keeps it
//! alive across failures: exponential backoff between attempts, a
//! circuit-open backstop after too many consecutive failures, and a shutdown
//! latch so reconnects stop once the server is draining. Connection errors
//! are absorbed here and surfaced as `None` results, never as panics or
//! unhandled rejections.

use crate::config::RemoteTierConfig;
use crate::remote::{RemoteCacheError, RemoteConnection, RemoteConnector};
use chrono::{DateTime, Utc};
use pagepilot_core::{ComponentEvent, EventListeners};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

/// Floor for the retry interval while the circuit is open.
const CIRCUIT_OPEN_RETRY_FLOOR: Duration = Duration::from_secs(60);

/// Lifecycle phase of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionPhase {
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
    #[serde(rename = "CONNECTING")]
    Connecting,
    #[serde(rename = "CONNECTED")]
    Connected,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CIRCUIT_OPEN")]
    CircuitOpen,
}

impl ConnectionPhase {
    /// Wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionPhase::Disconnected => "DISCONNECTED",
            ConnectionPhase::Connecting => "CONNECTING",
            ConnectionPhase::Connected => "CONNECTED",
            ConnectionPhase::Failed => "FAILED",
            ConnectionPhase::CircuitOpen => "CIRCUIT_OPEN",
        }
    }
}

/// Lifecycle events of the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected {
        at: Instant,
    },
    ConnectionFailed {
        at: Instant,
        error: String,
    },
    CircuitOpened {
        at: Instant,
    },
    StateChanged {
        at: Instant,
        from: ConnectionPhase,
        to: ConnectionPhase,
    },
}

impl ComponentEvent for ConnectionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected { .. } => "connected",
            ConnectionEvent::ConnectionFailed { .. } => "connection_failed",
            ConnectionEvent::CircuitOpened { .. } => "circuit_opened",
            ConnectionEvent::StateChanged { .. } => "state_changed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ConnectionEvent::Connected { at }
            | ConnectionEvent::ConnectionFailed { at, .. }
            | ConnectionEvent::CircuitOpened { at }
            | ConnectionEvent::StateChanged { at, .. } => *at,
        }
    }

    fn component(&self) -> &str {
        "remote-cache"
    }
}

/// Serializable view of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub phase: ConnectionPhase,
    pub total_attempts: u64,
    pub successes: u64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_in_ms: Option<u64>,
    pub current_delay_ms: u64,
}

struct ManagerState {
    phase: ConnectionPhase,
    connection: Option<Arc<dyn RemoteConnection>>,
    total_attempts: u64,
    successes: u64,
    consecutive_failures: u32,
    last_attempt: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    next_retry_at: Option<Instant>,
    current_delay: Duration,
    retry_task: Option<tokio::task::JoinHandle<()>>,
}

impl ManagerState {
    /// Moves to `to`, returning the transition for emission after unlock.
    fn set_phase(&mut self, to: ConnectionPhase) -> Option<(ConnectionPhase, ConnectionPhase)> {
        if self.phase == to {
            return None;
        }
        let from = self.phase;
        self.phase = to;
        Some((from, to))
    }
}

/// Manages the one connection to the remote cache.
pub struct ConnectionManager {
    config: RemoteTierConfig,
    connector: Arc<dyn RemoteConnector>,
    state: Mutex<ManagerState>,
    shutdown: AtomicBool,
    listeners: EventListeners<ConnectionEvent>,
    /// Back-reference used by the scheduled-retry task.
    self_ref: Weak<ConnectionManager>,
}

impl ConnectionManager {
    /// Creates a manager. No connection is attempted until [`connect`] or the
    /// first [`execute`].
    ///
    /// [`connect`]: ConnectionManager::connect
    /// [`execute`]: ConnectionManager::execute
    pub fn new(config: RemoteTierConfig, connector: Arc<dyn RemoteConnector>) -> Arc<Self> {
        Self::with_listeners(config, connector, EventListeners::new())
    }

    /// Creates a manager with pre-registered event listeners.
    pub fn with_listeners(
        config: RemoteTierConfig,
        connector: Arc<dyn RemoteConnector>,
        listeners: EventListeners<ConnectionEvent>,
    ) -> Arc<Self> {
        let initial_delay = Duration::from_millis(config.retry_delay_ms);
        Arc::new_cyclic(|self_ref| ConnectionManager {
            config,
            connector,
            state: Mutex::new(ManagerState {
                phase: ConnectionPhase::Disconnected,
                connection: None,
                total_attempts: 0,
                successes: 0,
                consecutive_failures: 0,
                last_attempt: None,
                last_success: None,
                next_retry_at: None,
                current_delay: initial_delay,
                retry_task: None,
            }),
            shutdown: AtomicBool::new(false),
            listeners,
            self_ref: self_ref.clone(),
        })
    }

    /// True while a live connection is held.
    pub fn is_connected(&self) -> bool {
        let state = self.state.lock().expect("connection state poisoned");
        state.phase == ConnectionPhase::Connected && state.connection.is_some()
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.state.lock().expect("connection state poisoned").phase
    }

    /// Serializable snapshot.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let now = Instant::now();
        let state = self.state.lock().expect("connection state poisoned");
        ConnectionSnapshot {
            phase: state.phase,
            total_attempts: state.total_attempts,
            successes: state.successes,
            consecutive_failures: state.consecutive_failures,
            last_attempt: state.last_attempt,
            last_success: state.last_success,
            next_retry_in_ms: state
                .next_retry_at
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            current_delay_ms: state.current_delay.as_millis() as u64,
        }
    }

    /// Attempts to connect. Idempotent: a no-op while already connecting,
    /// already connected, circuit-open before its retry time, or after
    /// [`disconnect`] has latched shutdown.
    ///
    /// [`disconnect`]: ConnectionManager::disconnect
    pub async fn connect(&self) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let transition = {
            let mut state = self.state.lock().expect("connection state poisoned");
            match state.phase {
                ConnectionPhase::Connecting => return,
                ConnectionPhase::Connected if state.connection.is_some() => return,
                ConnectionPhase::CircuitOpen => {
                    let ready = state
                        .next_retry_at
                        .map(|at| Instant::now() >= at)
                        .unwrap_or(true);
                    if !ready {
                        return;
                    }
                }
                _ => {}
            }
            state.total_attempts += 1;
            state.last_attempt = Some(Utc::now());
            state.set_phase(ConnectionPhase::Connecting)
        };
        self.emit_transition(transition);

        let timeout = Duration::from_millis(self.config.connection_timeout_ms);
        let attempt = tokio::time::timeout(timeout, self.connector.connect()).await;

        match attempt {
            Ok(Ok(connection)) => {
                let transition = {
                    let mut state = self.state.lock().expect("connection state poisoned");
                    state.connection = Some(connection);
                    state.consecutive_failures = 0;
                    state.current_delay = Duration::from_millis(self.config.retry_delay_ms);
                    state.next_retry_at = None;
                    state.successes += 1;
                    state.last_success = Some(Utc::now());
                    state.set_phase(ConnectionPhase::Connected)
                };
                self.emit_transition(transition);
                tracing::info!(url = %self.config.url, "remote cache connected");
                self.listeners.emit(&ConnectionEvent::Connected {
                    at: Instant::now(),
                });
            }
            Ok(Err(error)) => self.handle_failure(error.to_string()),
            Err(_) => self.handle_failure(format!(
                "connect timed out after {}ms",
                self.config.connection_timeout_ms
            )),
        }
    }

    /// Runs `op` against the live connection.
    ///
    /// Reconnects lazily when disconnected (unless the circuit is open).
    /// Returns `None` when no connection is available or the operation hits a
    /// transient connection error; the failure is recorded either way.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn RemoteConnection>) -> Fut,
        Fut: Future<Output = Result<T, RemoteCacheError>>,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }

        let connection = {
            let state = self.state.lock().expect("connection state poisoned");
            state.connection.clone()
        };

        let connection = match connection {
            Some(conn) => conn,
            None => {
                if self.phase() == ConnectionPhase::CircuitOpen {
                    return None;
                }
                self.connect().await;
                let state = self.state.lock().expect("connection state poisoned");
                state.connection.clone()?
            }
        };

        match op(connection).await {
            Ok(value) => Some(value),
            Err(error) => {
                // Drop the connection first so the failure bookkeeping sees a
                // disconnected manager.
                {
                    let mut state = self.state.lock().expect("connection state poisoned");
                    state.connection = None;
                }
                self.handle_failure(error.to_string());
                None
            }
        }
    }

    /// Closes the connection, cancels pending retries and latches shutdown.
    /// Further reconnects are suppressed.
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let transition = {
            let mut state = self.state.lock().expect("connection state poisoned");
            if let Some(task) = state.retry_task.take() {
                task.abort();
            }
            state.connection = None;
            state.next_retry_at = None;
            state.set_phase(ConnectionPhase::Disconnected)
        };
        self.emit_transition(transition);
        tracing::info!("remote cache disconnected");
    }

    /// Records one connection failure: backs the delay off, opens the circuit
    /// at the retry limit, and schedules the next attempt.
    fn handle_failure(&self, error: String) {
        let (delay, transition, circuit_opened, quiet) = {
            let mut state = self.state.lock().expect("connection state poisoned");
            state.consecutive_failures += 1;

            let opening = state.consecutive_failures >= self.config.connection_retry_limit;
            let delay = if opening {
                CIRCUIT_OPEN_RETRY_FLOOR.max(Duration::from_millis(self.config.max_retry_delay_ms))
            } else {
                state.current_delay
            };

            // Double toward the cap for the next round.
            let next = state.current_delay.as_millis() as f64 * self.config.backoff_multiplier;
            state.current_delay =
                Duration::from_millis((next as u64).min(self.config.max_retry_delay_ms));
            state.next_retry_at = Some(Instant::now() + delay);

            let was_open = state.phase == ConnectionPhase::CircuitOpen;
            let transition = if opening {
                state.set_phase(ConnectionPhase::CircuitOpen)
            } else {
                state.set_phase(ConnectionPhase::Failed)
            };
            (delay, transition, opening && !was_open, opening || was_open)
        };

        // Quiet logging while the circuit is open keeps a long outage from
        // flooding the logs.
        if quiet {
            tracing::debug!(error = %error, retry_in_ms = delay.as_millis() as u64, "remote cache connection failed");
        } else {
            tracing::warn!(error = %error, retry_in_ms = delay.as_millis() as u64, "remote cache connection failed");
        }

        self.emit_transition(transition);
        self.listeners.emit(&ConnectionEvent::ConnectionFailed {
            at: Instant::now(),
            error,
        });
        if circuit_opened {
            self.listeners.emit(&ConnectionEvent::CircuitOpened {
                at: Instant::now(),
            });
        }

        self.schedule_retry(delay);
    }

    fn schedule_retry(&self, delay: Duration) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !manager.shutdown.load(Ordering::SeqCst) {
                manager.connect().await;
            }
        });
        let mut state = self.state.lock().expect("connection state poisoned");
        if let Some(previous) = state.retry_task.replace(task) {
            previous.abort();
        }
    }

    fn emit_transition(&self, transition: Option<(ConnectionPhase, ConnectionPhase)>) {
        if let Some((from, to)) = transition {
            self.listeners.emit(&ConnectionEvent::StateChanged {
                at: Instant::now(),
                from,
                to,
            });
        }
    }
}
