//! Request-level error taxonomy.
//!
//! Each stage of the request pipeline classifies only what it understands;
//! anything else bubbles to the outermost boundary as [`PipelineError::Internal`].
//! The taxonomy carries its own HTTP status and wire error-code mapping so
//! both transports shape failures identically.

use crate::severity::Severity;
use serde::Serialize;
use thiserror::Error;

/// Wire error codes emitted in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "BAD_REQUEST")]
    BadRequest,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "REQUEST_TOO_LARGE")]
    RequestTooLarge,
    #[serde(rename = "SERVICE_UNAVAILABLE")]
    ServiceUnavailable,
    #[serde(rename = "INTERNAL_SERVER_ERROR")]
    InternalServerError,
    #[serde(rename = "RESPONSE_TRANSFORMATION_ERROR")]
    ResponseTransformationError,
    #[serde(rename = "MCP_TOOL_ERROR")]
    McpToolError,
    #[serde(rename = "OPERATION_FAILED")]
    OperationFailed,
}

impl ErrorCode {
    /// The code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::RequestTooLarge => "REQUEST_TOO_LARGE",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::ResponseTransformationError => "RESPONSE_TRANSFORMATION_ERROR",
            ErrorCode::McpToolError => "MCP_TOOL_ERROR",
            ErrorCode::OperationFailed => "OPERATION_FAILED",
        }
    }
}

/// The classified failure modes of one request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Schema validation rejected the arguments. Never cached, never retried.
    #[error("validation failed: {}", violations.join("; "))]
    Validation {
        /// One message per violated rule.
        violations: Vec<String>,
    },

    /// The request was syntactically unusable (bad JSON, missing body).
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// The referenced entity does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Declared body size exceeded the configured cap; the body was not read.
    #[error("request of {declared_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    RequestTooLarge {
        declared_bytes: u64,
        limit_bytes: u64,
    },

    /// The named tool is not part of the catalog.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// An adapter failed while serving the call.
    #[error("source '{adapter}' failed: {message}")]
    Source { adapter: String, message: String },

    /// The call exceeded its deadline. The cache MUST NOT be mutated.
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout {
        elapsed_ms: u64,
        retry_after_ms: Option<u64>,
    },

    /// A circuit breaker fast-failed the call without invoking it.
    #[error("circuit '{name}' is open")]
    CircuitOpen {
        name: String,
        retry_after_ms: Option<u64>,
    },

    /// Cache failure. Non-fatal for the request; surfaced only in headers.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// The response could not be shaped for the wire.
    #[error("response transformation failed: {message}")]
    Serialization { message: String },

    /// Anything the stages could not classify.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Convenience constructor for a single-violation validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation {
            violations: vec![message.into()],
        }
    }

    /// Convenience constructor for internal errors.
    pub fn internal(message: impl Into<String>) -> Self {
        PipelineError::Internal {
            message: message.into(),
        }
    }

    /// Wire error code for the envelope.
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Validation { .. } => ErrorCode::ValidationError,
            PipelineError::BadRequest { .. } => ErrorCode::BadRequest,
            PipelineError::NotFound { .. } => ErrorCode::NotFound,
            PipelineError::RequestTooLarge { .. } => ErrorCode::RequestTooLarge,
            PipelineError::UnknownTool { .. } => ErrorCode::McpToolError,
            PipelineError::Source { .. } => ErrorCode::OperationFailed,
            PipelineError::Timeout { .. } | PipelineError::CircuitOpen { .. } => {
                ErrorCode::ServiceUnavailable
            }
            PipelineError::Cache { .. } => ErrorCode::OperationFailed,
            PipelineError::Serialization { .. } => ErrorCode::ResponseTransformationError,
            PipelineError::Internal { .. } => ErrorCode::InternalServerError,
        }
    }

    /// HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            PipelineError::Validation { .. } | PipelineError::BadRequest { .. } => 400,
            PipelineError::NotFound { .. } | PipelineError::UnknownTool { .. } => 404,
            PipelineError::RequestTooLarge { .. } => 413,
            PipelineError::Source { .. } => 502,
            PipelineError::Timeout { .. } | PipelineError::CircuitOpen { .. } => 503,
            PipelineError::Cache { .. }
            | PipelineError::Serialization { .. }
            | PipelineError::Internal { .. } => 500,
        }
    }

    /// Severity reported in the error body.
    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::Validation { .. }
            | PipelineError::BadRequest { .. }
            | PipelineError::NotFound { .. }
            | PipelineError::UnknownTool { .. } => Severity::Low,
            PipelineError::RequestTooLarge { .. } | PipelineError::Cache { .. } => Severity::Medium,
            PipelineError::Source { .. }
            | PipelineError::Timeout { .. }
            | PipelineError::CircuitOpen { .. } => Severity::High,
            PipelineError::Serialization { .. } | PipelineError::Internal { .. } => {
                Severity::Critical
            }
        }
    }

    /// Suggested client retry delay, when one applies.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            PipelineError::Timeout { retry_after_ms, .. } => retry_after_ms.or(Some(1_000)),
            PipelineError::CircuitOpen { retry_after_ms, .. } => retry_after_ms.or(Some(30_000)),
            PipelineError::Source { .. } => Some(5_000),
            _ => None,
        }
    }

    /// Structured details for the error body.
    pub fn details(&self) -> serde_json::Value {
        match self {
            PipelineError::Validation { violations } => serde_json::json!({
                "validation_errors": violations,
            }),
            PipelineError::RequestTooLarge {
                declared_bytes,
                limit_bytes,
            } => serde_json::json!({
                "declared_bytes": declared_bytes,
                "limit_bytes": limit_bytes,
            }),
            PipelineError::Source { adapter, .. } => serde_json::json!({
                "adapter": adapter,
            }),
            PipelineError::CircuitOpen { name, .. } => serde_json::json!({
                "circuit": name,
            }),
            _ => serde_json::Value::Null,
        }
    }
}

/// Key fragments that mark a field as sensitive in free-form maps.
pub const SENSITIVE_KEY_FRAGMENTS: [&str; 5] = ["password", "token", "key", "secret", "auth"];

/// Returns true when `key` names a credential-bearing field.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lower.contains(fragment))
}

/// Recursively removes sensitive fields from `value`.
///
/// Applied to free-form context maps on the way in and to error details on
/// the way out, so credentials never round-trip through logs or responses.
pub fn strip_sensitive_fields(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|key, _| !is_sensitive_key(key));
            for nested in map.values_mut() {
                strip_sensitive_fields(nested);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                strip_sensitive_fields(item);
            }
        }
        _ => {}
    }
}
