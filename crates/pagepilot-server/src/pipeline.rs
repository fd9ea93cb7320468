//! The per-tool request pipeline shared by both transports.
//!
//! Stages: tool resolution → schema validation → transform → cache probe →
//! dispatch under the severity-tiered timeout → cache store on success →
//! envelope shaping. HTTP-specific concerns (headers, correlation middleware,
//! size limits) live in the transport layer.

use crate::state::AppState;
use crate::strategy::{adjust_ttl, base_ttl_seconds, strategy_for};
use crate::tools::ToolName;
use crate::transform::transform;
use crate::validation::schema_for;
use chrono::Timelike;
use pagepilot_cache::Fingerprint;
use pagepilot_core::{ApiResponse, CorrelationId, PipelineError, ResponseMetadata};
use serde_json::{json, Value};
use std::time::Instant;

/// Cache disposition of one call, surfaced as `X-Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Error,
    /// The tool or configuration does not use the cache.
    Bypass,
}

impl CacheStatus {
    /// Header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Error => "ERROR",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// Outcome of one pipeline run, ready for transport shaping.
#[derive(Debug)]
pub struct ToolCallOutcome {
    pub response: ApiResponse,
    pub status: u16,
    pub cache_status: CacheStatus,
    pub cache_strategy: Option<&'static str>,
    pub elapsed_ms: u64,
}

/// Runs the full pipeline for one tool call.
pub async fn handle_tool_call(
    state: &AppState,
    tool_name: &str,
    args: Value,
    correlation: &CorrelationId,
) -> ToolCallOutcome {
    let started = Instant::now();

    let tool: ToolName = match tool_name.parse() {
        Ok(tool) => tool,
        Err(_) => {
            let err = PipelineError::UnknownTool {
                name: tool_name.to_string(),
            };
            return failure_outcome(err, correlation, None, started);
        }
    };

    let violations = schema_for(tool).validate(&args);
    if !violations.is_empty() {
        let err = PipelineError::Validation { violations };
        return failure_outcome(err, correlation, Some(tool), started);
    }

    let transformed = match transform(tool, args) {
        Ok(transformed) => transformed,
        Err(err) => return failure_outcome(err, correlation, Some(tool), started),
    };

    let strategy = strategy_for(tool, &transformed.args, &transformed.hints);
    let cacheable = tool.cacheable() && state.cache.is_enabled();
    let fingerprint = cacheable.then(|| {
        Fingerprint::for_search(
            tool.content_type(),
            &json!({"tool": tool.as_str(), "args": transformed.args}),
        )
    });

    if let Some(fingerprint) = &fingerprint {
        if let Some(cached) = state.cache.get(fingerprint).await {
            let mut metadata = ResponseMetadata::new(correlation);
            metadata.tool_name = Some(tool.as_str().to_string());
            metadata.cached = Some(true);
            metadata.cache_strategy = Some(strategy.to_string());
            metadata.response_time_ms = Some(elapsed_ms(started));
            return ToolCallOutcome {
                response: ApiResponse::ok(cached, metadata),
                status: 200,
                cache_status: CacheStatus::Hit,
                cache_strategy: Some(strategy),
                elapsed_ms: elapsed_ms(started),
            };
        }
    }

    let dispatch = state.dispatcher.dispatch(tool, &transformed);
    let outcome = match transformed.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, dispatch).await {
            Ok(result) => result,
            Err(_) => {
                // The dispatch future is dropped; the dispatcher never saw it
                // complete, so record the sample here. The cache is not
                // touched on timeout.
                state
                    .perf
                    .record(tool.as_str(), timeout.as_secs_f64() * 1000.0, true);
                Err(PipelineError::Timeout {
                    elapsed_ms: timeout.as_millis() as u64,
                    retry_after_ms: Some(timeout.as_millis() as u64),
                })
            }
        },
        None => dispatch.await,
    };

    let dispatched = match outcome {
        Ok(dispatched) => dispatched,
        Err(err) => return failure_outcome(err, correlation, Some(tool), started),
    };

    let cache_status = if let Some(fingerprint) = &fingerprint {
        let ttl = adjust_ttl(
            base_ttl_seconds(strategy),
            tool.content_type(),
            chrono::Utc::now().hour(),
        );
        state
            .cache
            .set_with_ttl(fingerprint, dispatched.data.clone(), ttl)
            .await;
        CacheStatus::Miss
    } else {
        CacheStatus::Bypass
    };

    let mut metadata = ResponseMetadata::new(correlation);
    metadata.tool_name = Some(tool.as_str().to_string());
    metadata.cache_strategy = cacheable.then(|| strategy.to_string());
    metadata.response_time_ms = Some(elapsed_ms(started));
    if !dispatched.partial_failures.is_empty() {
        metadata.partial_failures = Some(json!(dispatched.partial_failures));
    }

    ToolCallOutcome {
        response: ApiResponse::ok(dispatched.data, metadata),
        status: 200,
        cache_status,
        cache_strategy: cacheable.then_some(strategy),
        elapsed_ms: elapsed_ms(started),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn failure_outcome(
    err: PipelineError,
    correlation: &CorrelationId,
    tool: Option<ToolName>,
    started: Instant,
) -> ToolCallOutcome {
    tracing::warn!(
        correlation_id = %correlation,
        tool = tool.map(|t| t.as_str()).unwrap_or("?"),
        error = %err,
        code = err.code().as_str(),
        "tool call failed"
    );
    let mut metadata = ResponseMetadata::new(correlation);
    metadata.tool_name = tool.map(|t| t.as_str().to_string());
    metadata.response_time_ms = Some(elapsed_ms(started));
    let status = err.http_status();
    ToolCallOutcome {
        response: ApiResponse::failure(&err, metadata),
        status,
        cache_status: CacheStatus::Bypass,
        cache_strategy: None,
        elapsed_ms: elapsed_ms(started),
    }
}
