//! Prometheus text exposition with stable `pp_` metric names.

use crate::state::AppState;
use std::fmt::Write;

/// Renders the exposition body for `/metrics?format=prometheus`.
pub async fn render(state: &AppState) -> String {
    let summary = state.perf.global_summary();
    let resources = state.perf.resource_usage();
    let cache = state.cache.stats();
    let tools = state.perf.all_tool_stats();
    let sources = state.adapters.health_check_all().await;
    let metadata = state.adapters.metadata_all().await;

    let mut out = String::with_capacity(4096);

    gauge(&mut out, "pp_uptime_seconds", "Server uptime in seconds", summary.uptime_seconds as f64);
    gauge(&mut out, "pp_memory_rss_bytes", "Resident memory in bytes", resources.rss_bytes as f64);
    gauge(&mut out, "pp_memory_heap_bytes", "Virtual memory in bytes", resources.virtual_bytes as f64);

    gauge(&mut out, "pp_cache_hit_rate", "Cache hit rate", cache.hit_rate);
    counter(&mut out, "pp_cache_hits_total", "Cache hits", cache.hits as f64);
    counter(&mut out, "pp_cache_misses_total", "Cache misses", cache.misses as f64);
    counter(&mut out, "pp_cache_operations_total", "Cache lookups", cache.total_operations as f64);

    header(&mut out, "pp_tool_calls_total", "counter", "Tool calls");
    for tool in &tools {
        let _ = writeln!(out, "pp_tool_calls_total{{tool=\"{}\"}} {}", tool.tool, tool.total_calls);
    }
    header(&mut out, "pp_tool_errors_total", "counter", "Tool call errors");
    for tool in &tools {
        let _ = writeln!(out, "pp_tool_errors_total{{tool=\"{}\"}} {}", tool.tool, tool.error_count);
    }
    header(&mut out, "pp_tool_avg_duration_ms", "gauge", "Average tool call duration");
    for tool in &tools {
        let _ = writeln!(out, "pp_tool_avg_duration_ms{{tool=\"{}\"}} {:.3}", tool.tool, tool.avg_ms);
    }
    header(&mut out, "pp_tool_error_rate", "gauge", "Tool call error rate");
    for tool in &tools {
        let _ = writeln!(out, "pp_tool_error_rate{{tool=\"{}\"}} {:.4}", tool.tool, tool.error_rate);
    }

    header(&mut out, "pp_source_healthy", "gauge", "Source adapter health (1 healthy, 0 unhealthy)");
    for source in &sources {
        let adapter_type = metadata
            .iter()
            .find(|meta| meta.name == source.name)
            .map(|meta| meta.adapter_type.as_str())
            .unwrap_or("unknown");
        let _ = writeln!(
            out,
            "pp_source_healthy{{source=\"{}\",type=\"{}\"}} {}",
            source.name,
            adapter_type,
            if source.healthy { 1 } else { 0 }
        );
    }
    header(&mut out, "pp_source_response_time_ms", "gauge", "Source adapter health-check latency");
    for source in &sources {
        let adapter_type = metadata
            .iter()
            .find(|meta| meta.name == source.name)
            .map(|meta| meta.adapter_type.as_str())
            .unwrap_or("unknown");
        let _ = writeln!(
            out,
            "pp_source_response_time_ms{{source=\"{}\",type=\"{}\"}} {}",
            source.name, adapter_type, source.response_time_ms
        );
    }

    out
}

fn header(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn gauge(out: &mut String, name: &str, help: &str, value: f64) {
    header(out, name, "gauge", help);
    let _ = writeln!(out, "{name} {value}");
}

fn counter(out: &mut String, name: &str, help: &str, value: f64) {
    header(out, name, "counter", help);
    let _ = writeln!(out, "{name} {value}");
}
