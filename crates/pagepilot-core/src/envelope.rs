//! The response envelope shared by the HTTP and stream-RPC transports.

use crate::correlation::CorrelationId;
use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata block attached to every response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_failures: Option<serde_json::Value>,
}

impl ResponseMetadata {
    /// Fresh metadata for the given request.
    pub fn new(correlation_id: &CorrelationId) -> Self {
        ResponseMetadata {
            correlation_id: correlation_id.as_str().to_string(),
            timestamp: Utc::now(),
            tool_name: None,
            performance_tier: None,
            cache_strategy: None,
            cached: None,
            response_time_ms: None,
            partial_failures: None,
        }
    }
}

/// Wire body of a failed request.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// The `{success, data | error, metadata}` envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

impl ApiResponse {
    /// A successful envelope wrapping `data`.
    pub fn ok(data: serde_json::Value, metadata: ResponseMetadata) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    /// A failure envelope shaped from the error taxonomy.
    ///
    /// Sensitive fields are stripped from the details before emission.
    pub fn failure(err: &PipelineError, metadata: ResponseMetadata) -> Self {
        let mut details = err.details();
        crate::error::strip_sensitive_fields(&mut details);
        ApiResponse {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: err.code().as_str(),
                message: err.to_string(),
                severity: err.severity().to_string(),
                retry_after_ms: err.retry_after_ms(),
                context: serde_json::Value::Null,
                details,
            }),
            metadata,
        }
    }

    /// HTTP status implied by this envelope (200 for successes).
    pub fn implied_status(&self, err: Option<&PipelineError>) -> u16 {
        match err {
            Some(e) => e.http_status(),
            None => 200,
        }
    }
}
