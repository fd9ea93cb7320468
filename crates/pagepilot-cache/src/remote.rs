//! The remote-tier contract.
//!
//! The concrete remote client (a Redis deployment in production) is an
//! external collaborator: PagePilot only depends on these two traits. The
//! [`InMemoryConnector`] ships for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failures of the remote tier.
#[derive(Debug, Clone, Error)]
pub enum RemoteCacheError {
    /// The server is unreachable or the connection dropped.
    #[error("remote cache unavailable: {0}")]
    Unavailable(String),
    /// The operation reached the server but failed there.
    #[error("remote cache operation failed: {0}")]
    Operation(String),
    /// A stored value could not be decoded.
    #[error("remote cache payload corrupt: {0}")]
    Corrupt(String),
}

/// One live connection to the remote tier.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Fetches the raw value for `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteCacheError>;

    /// Stores `value` under `key` with the given TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RemoteCacheError>;

    /// Deletes one key.
    async fn delete(&self, key: &str) -> Result<(), RemoteCacheError>;

    /// Deletes every key starting with `prefix`. Returns the number deleted.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, RemoteCacheError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), RemoteCacheError>;
}

/// Factory for remote connections, driven by the connection manager.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Establishes a fresh connection.
    async fn connect(&self) -> Result<Arc<dyn RemoteConnection>, RemoteCacheError>;
}

/// In-process remote tier used in tests and single-node deployments.
///
/// The `fail` switch simulates an outage: connects and every operation on
/// live connections start failing until it is cleared.
pub struct InMemoryConnector {
    store: Arc<Mutex<HashMap<String, (String, Option<Instant>)>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryConnector {
    /// Creates a connector backed by an empty store.
    pub fn new() -> Self {
        InMemoryConnector {
            store: Arc::new(Mutex::new(HashMap::new())),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulates (or clears) an outage.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.store
            .lock()
            .expect("in-memory remote lock poisoned")
            .values()
            .filter(|(_, expiry)| expiry.map(|at| at > now).unwrap_or(true))
            .count()
    }

    /// True when no live keys remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteConnector for InMemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteConnection>, RemoteCacheError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteCacheError::Unavailable(
                "simulated outage".to_string(),
            ));
        }
        Ok(Arc::new(InMemoryConnection {
            store: Arc::clone(&self.store),
            fail: Arc::clone(&self.fail),
        }))
    }
}

struct InMemoryConnection {
    store: Arc<Mutex<HashMap<String, (String, Option<Instant>)>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryConnection {
    fn check_up(&self) -> Result<(), RemoteCacheError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RemoteCacheError::Unavailable(
                "simulated outage".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteConnection for InMemoryConnection {
    async fn get(&self, key: &str) -> Result<Option<String>, RemoteCacheError> {
        self.check_up()?;
        let mut store = self.store.lock().expect("in-memory remote lock poisoned");
        match store.get(key) {
            Some((_, Some(expiry))) if *expiry <= Instant::now() => {
                store.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RemoteCacheError> {
        self.check_up()?;
        let expiry = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.store
            .lock()
            .expect("in-memory remote lock poisoned")
            .insert(key.to_string(), (value, expiry));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteCacheError> {
        self.check_up()?;
        self.store
            .lock()
            .expect("in-memory remote lock poisoned")
            .remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, RemoteCacheError> {
        self.check_up()?;
        let mut store = self.store.lock().expect("in-memory remote lock poisoned");
        let doomed: Vec<String> = store
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            store.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn ping(&self) -> Result<(), RemoteCacheError> {
        self.check_up()
    }
}
