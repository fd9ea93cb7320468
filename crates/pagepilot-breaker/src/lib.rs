//! Circuit breaker for PagePilot's external dependencies.
//!
//! A breaker isolates one callable dependency behind the classic three-state
//! machine:
//!
//! - **Closed**: calls run under the breaker's timeout; failures accumulate
//!   in a sliding time window.
//! - **Open**: calls fast-fail without invoking the dependency until the
//!   recovery timeout elapses.
//! - **HalfOpen**: probe calls run; enough consecutive successes close the
//!   circuit, any failure re-opens it.
//!
//! Breakers are shared per dependency through [`BreakerRegistry`], which
//! hands out named singletons tuned per dependency class (external service,
//! cache, database).
//!
//! # Example
//!
//! ```
//! use pagepilot_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::new(
//!     BreakerConfig::builder()
//!         .name("example")
//!         .failure_threshold(3)
//!         .recovery_timeout(Duration::from_millis(100))
//!         .build(),
//! );
//!
//! let result: Result<u32, _> = breaker.execute(|| async { Ok::<_, String>(7) }).await;
//! assert_eq!(result.unwrap(), 7);
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! # }
//! ```

mod breaker;
mod config;
mod error;
mod events;
mod registry;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use error::BreakerError;
pub use events::BreakerEvent;
pub use registry::{BreakerRegistry, RegistryHealthSummary};
