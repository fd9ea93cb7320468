//! The HTTP front door: routes, middleware and response headers.

use crate::pipeline::{handle_tool_call, CacheStatus, ToolCallOutcome};
use crate::state::AppState;
use crate::strategy::performance_tier;
use crate::tools::ToolName;
use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use pagepilot_core::{ApiResponse, CorrelationId, PipelineError, ResponseMetadata};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Builds the full router with middleware applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .route("/health/cache", get(health_cache))
        .route("/health/sources", get(health_sources))
        .route("/health/performance", get(health_performance))
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/metrics", get(metrics))
        .route("/mcp/call", post(mcp_call))
        .route("/api/search", post(api_search))
        .route("/api/runbooks/search", post(api_runbooks_search))
        .route("/api/decision-tree", post(api_decision_tree))
        .route("/api/procedures/:id", get(api_get_procedure))
        .route("/api/procedures/:id/execute", post(api_execute_procedure))
        .route("/api/escalation", post(api_escalation))
        .route("/api/sources", get(api_sources))
        .route("/api/feedback", post(api_feedback))
        .route("/performance", get(performance_report))
        .route("/performance/reset", post(performance_reset))
        .route("/monitoring/status", get(monitoring_status))
        .route("/monitoring/alerts", get(monitoring_alerts))
        .route("/monitoring/alerts/active", get(monitoring_alerts_active))
        .route("/monitoring/alerts/:id/resolve", post(monitoring_resolve))
        .route("/monitoring/rules", get(monitoring_rules))
        .route("/circuit-breakers", get(breakers_list))
        .route("/circuit-breakers/:name/reset", post(breakers_reset))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            size_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Outermost request middleware: correlation stamping, the request span,
/// timing headers and security headers.
async fn context_middleware(
    State(_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let supplied = request
        .headers()
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let correlation = CorrelationId::accept_or_generate(supplied.as_deref());
    request.extensions_mut().insert(correlation.clone());

    let path = request.uri().path().to_string();
    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation,
        method = %request.method(),
        path = %path,
    );

    let mut response = next.run(request).instrument(span).await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(correlation.as_str()) {
        headers.insert("x-correlation-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        headers.insert("x-response-time", value);
    }
    headers.insert(
        "x-performance-tier",
        HeaderValue::from_static(performance_tier(&path, elapsed_ms)),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        "x-xss-protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    response
}

/// Rejects requests whose declared body size exceeds the cap, before the
/// body is read.
async fn size_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.server.max_request_mb * 1024 * 1024;
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    if let Some(declared) = declared {
        if declared > limit {
            let correlation = request
                .extensions()
                .get::<CorrelationId>()
                .cloned()
                .unwrap_or_else(CorrelationId::generate);
            let err = PipelineError::RequestTooLarge {
                declared_bytes: declared,
                limit_bytes: limit,
            };
            let body = ApiResponse::failure(&err, ResponseMetadata::new(&correlation));
            return (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response();
        }
    }

    next.run(request).await
}

fn parse_body(bytes: &Bytes) -> Result<Value, PipelineError> {
    if bytes.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(bytes).map_err(|error| PipelineError::BadRequest {
        message: format!("invalid JSON body: {error}"),
    })
}

/// Shapes one pipeline outcome into an HTTP response with cache headers and
/// the per-path performance tier in the envelope metadata.
fn shape(outcome: ToolCallOutcome, path: &str) -> Response {
    let mut response = outcome.response;
    response.metadata.performance_tier =
        Some(performance_tier(path, outcome.elapsed_ms).to_string());

    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http_response = (status, Json(response)).into_response();

    if outcome.cache_status != CacheStatus::Bypass {
        http_response.headers_mut().insert(
            "x-cache",
            HeaderValue::from_static(outcome.cache_status.as_str()),
        );
    }
    if let Some(strategy) = outcome.cache_strategy {
        http_response
            .headers_mut()
            .insert("x-cache-strategy", HeaderValue::from_static(strategy));
    }
    http_response
}

async fn run_tool(
    state: &AppState,
    correlation: &CorrelationId,
    tool: ToolName,
    body: Result<Value, PipelineError>,
    path: &str,
) -> Response {
    match body {
        Ok(args) => {
            let outcome = handle_tool_call(state, tool.as_str(), args, correlation).await;
            shape(outcome, path)
        }
        Err(err) => {
            let body = ApiResponse::failure(&err, ResponseMetadata::new(correlation));
            (
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_REQUEST),
                Json(body),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Tool-call routes
// ---------------------------------------------------------------------------

async fn api_search(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    bytes: Bytes,
) -> Response {
    run_tool(
        &state,
        &correlation,
        ToolName::SearchKnowledgeBase,
        parse_body(&bytes),
        "/api/search",
    )
    .await
}

async fn api_runbooks_search(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    bytes: Bytes,
) -> Response {
    run_tool(
        &state,
        &correlation,
        ToolName::SearchRunbooks,
        parse_body(&bytes),
        "/api/runbooks/search",
    )
    .await
}

async fn api_decision_tree(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    bytes: Bytes,
) -> Response {
    run_tool(
        &state,
        &correlation,
        ToolName::GetDecisionTree,
        parse_body(&bytes),
        "/api/decision-tree",
    )
    .await
}

async fn api_get_procedure(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    run_tool(
        &state,
        &correlation,
        ToolName::GetProcedure,
        Ok(json!({"procedure_id": id})),
        "/api/procedures",
    )
    .await
}

async fn api_execute_procedure(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> Response {
    // Execution is advisory: the procedure is fetched and returned with an
    // execution envelope; the operator confirms each step out of band.
    let args = match parse_body(&bytes) {
        Ok(mut args) => {
            if let Some(map) = args.as_object_mut() {
                map.insert("procedure_id".into(), json!(id));
                map.retain(|key, _| key == "procedure_id" || key == "section");
            }
            Ok(args)
        }
        Err(err) => Err(err),
    };
    run_tool(
        &state,
        &correlation,
        ToolName::GetProcedure,
        args,
        "/api/procedures/execute",
    )
    .await
}

async fn api_escalation(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    bytes: Bytes,
) -> Response {
    run_tool(
        &state,
        &correlation,
        ToolName::GetEscalationPath,
        parse_body(&bytes),
        "/api/escalation",
    )
    .await
}

async fn api_sources(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let include_health = params
        .get("include_health")
        .map(|value| value == "true")
        .unwrap_or(true);
    run_tool(
        &state,
        &correlation,
        ToolName::ListSources,
        Ok(json!({"include_health": include_health})),
        "/api/sources",
    )
    .await
}

async fn api_feedback(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    bytes: Bytes,
) -> Response {
    run_tool(
        &state,
        &correlation,
        ToolName::RecordResolutionFeedback,
        parse_body(&bytes),
        "/api/feedback",
    )
    .await
}

async fn mcp_call(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    bytes: Bytes,
) -> Response {
    let parsed = parse_body(&bytes);
    match parsed {
        Ok(body) => {
            let tool = body
                .get("tool")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args = body.get("arguments").cloned().unwrap_or(json!({}));
            let outcome = handle_tool_call(&state, &tool, args, &correlation).await;
            shape(outcome, "/mcp/call")
        }
        Err(err) => {
            let body = ApiResponse::failure(&err, ResponseMetadata::new(&correlation));
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Health and readiness
// ---------------------------------------------------------------------------

fn health_status(overall: bool) -> StatusCode {
    if overall {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let (overall, _) = state.overall_health().await;
    (
        health_status(overall),
        Json(json!({
            "status": if overall { "healthy" } else { "unhealthy" },
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        })),
    )
        .into_response()
}

async fn health_detailed(State(state): State<AppState>) -> Response {
    let (overall, components) = state.overall_health().await;
    (
        health_status(overall),
        Json(json!({
            "status": if overall { "healthy" } else { "unhealthy" },
            "components": components,
        })),
    )
        .into_response()
}

async fn health_cache(State(state): State<AppState>) -> Response {
    let report = state.cache.health().await;
    (
        health_status(report.overall_healthy),
        Json(json!({"cache": report, "stats": state.cache.stats()})),
    )
        .into_response()
}

async fn health_sources(State(state): State<AppState>) -> Response {
    let sources = state.adapters.health_check_all().await;
    let healthy = sources.iter().filter(|s| s.healthy).count();
    let total = sources.len();
    let ok = total == 0 || healthy * 2 >= total;
    (
        health_status(ok),
        Json(json!({"healthy": healthy, "total": total, "sources": sources})),
    )
        .into_response()
}

async fn health_performance(State(state): State<AppState>) -> Response {
    let summary = state.perf.global_summary();
    let ok = summary.p95_ms < 2000.0 && summary.error_rate < 0.10;
    (
        health_status(ok),
        Json(json!({"summary": summary, "resources": state.perf.resource_usage()})),
    )
        .into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    let sources = state.adapters.metadata_all().await;
    let all_ready = sources.iter().all(|meta| meta.ready);
    let ok = all_ready && state.healthy.load(Ordering::SeqCst);
    (
        health_status(ok),
        Json(json!({"ready": ok, "sources_ready": all_ready})),
    )
        .into_response()
}

async fn live() -> Response {
    (StatusCode::OK, Json(json!({"status": "alive"}))).into_response()
}

// ---------------------------------------------------------------------------
// Metrics, performance, monitoring, breakers
// ---------------------------------------------------------------------------

async fn metrics(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("format").map(String::as_str) == Some("prometheus") {
        let body = crate::prometheus::render(&state).await;
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response()
    } else {
        Json(json!({
            "summary": state.perf.global_summary(),
            "tools": state.perf.all_tool_stats(),
            "resources": state.perf.resource_usage(),
            "cache": state.cache.stats(),
        }))
        .into_response()
    }
}

async fn performance_report(State(state): State<AppState>) -> Response {
    Json(state.perf.generate_report()).into_response()
}

async fn performance_reset(State(state): State<AppState>) -> Response {
    state.perf.reset();
    Json(json!({"reset": true})).into_response()
}

async fn monitoring_status(State(state): State<AppState>) -> Response {
    Json(state.monitoring.status()).into_response()
}

async fn monitoring_alerts(State(state): State<AppState>) -> Response {
    Json(json!({"alerts": state.monitoring.history()})).into_response()
}

async fn monitoring_alerts_active(State(state): State<AppState>) -> Response {
    Json(json!({"alerts": state.monitoring.active_alerts()})).into_response()
}

async fn monitoring_rules(State(state): State<AppState>) -> Response {
    Json(json!({"rules": state.monitoring.status().rules})).into_response()
}

async fn monitoring_resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.monitoring.resolve(&id) {
        Json(json!({"resolved": true, "alert_id": id})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"resolved": false, "error": format!("no active alert '{id}'")})),
        )
            .into_response()
    }
}

async fn breakers_list(State(state): State<AppState>) -> Response {
    Json(json!({
        "breakers": state.breakers.snapshots(),
        "summary": state.breakers.health_summary(),
    }))
    .into_response()
}

async fn breakers_reset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    if state.breakers.reset(&name) {
        Json(json!({"reset": true, "breaker": name})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"reset": false, "error": format!("no breaker '{name}'")})),
        )
            .into_response()
    }
}
