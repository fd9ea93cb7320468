//! Shared substrate for the PagePilot serving runtime.
//!
//! This crate carries the pieces every other PagePilot crate leans on:
//!
//! - [`events`]: typed observer lists with synchronous fan-out, used by the
//!   circuit breaker, the remote-cache connection manager, and the
//!   performance monitor for their lifecycle notifications.
//! - [`error`]: the request-level error taxonomy with HTTP status and
//!   error-code mapping.
//! - [`correlation`]: request correlation ids (`req_<timestamp>_<hex>`).
//! - [`content`]: the closed set of cacheable content types.
//! - [`severity`]: incident severity levels shared by transforms, alerts and
//!   escalation logic.
//! - [`envelope`]: the `{success, data, metadata}` response envelope both
//!   transports emit.
//! - [`health`]: component health primitives.

pub mod content;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod events;
pub mod health;
pub mod severity;

pub use content::ContentType;
pub use correlation::CorrelationId;
pub use envelope::{ApiResponse, ErrorBody, ResponseMetadata};
pub use error::{ErrorCode, PipelineError};
pub use events::{ComponentEvent, EventListener, EventListeners, FnListener};
pub use health::{ComponentHealth, HealthStatus};
pub use severity::Severity;
