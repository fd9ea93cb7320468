//! Breaker error type.

use std::time::Duration;
use thiserror::Error;

/// Failure modes of a breaker-guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the dependency was not invoked.
    #[error("circuit '{name}' is open")]
    CircuitOpen {
        name: String,
        /// Time until the next half-open probe is admitted.
        retry_after: Duration,
    },

    /// The call did not settle within the breaker's timeout.
    #[error("circuit '{name}' call timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The dependency itself failed.
    #[error("dependency call failed")]
    Inner(#[source] E),
}

impl<E> BreakerError<E> {
    /// True when the call was fast-failed without invoking the dependency.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, BreakerError::CircuitOpen { .. })
    }

    /// True when the breaker's timeout fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// Extracts the dependency error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        let open: BreakerError<String> = BreakerError::CircuitOpen {
            name: "x".into(),
            retry_after: Duration::from_secs(1),
        };
        assert!(open.is_circuit_open());
        assert!(!open.is_timeout());

        let inner: BreakerError<String> = BreakerError::Inner("boom".into());
        assert_eq!(inner.into_inner().as_deref(), Some("boom"));
    }
}
