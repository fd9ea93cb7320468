//! Operator-facing performance report.

use crate::monitor::{GlobalSummary, PerformanceMonitor, ToolStats};
use crate::resources::ResourceUsage;
use chrono::{DateTime, Utc};
use serde::Serialize;

const GIB: u64 = 1024 * 1024 * 1024;

/// Report header.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub global: GlobalSummary,
    pub resources: ResourceUsage,
}

/// Full report: summary, per-tool stats, recommendations and alerts.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub summary: ReportSummary,
    pub tools: Vec<ToolStats>,
    pub recommendations: Vec<String>,
    pub alerts: Vec<String>,
}

impl PerformanceMonitor {
    /// Builds the report from the current rings and resource sample.
    pub fn generate_report(&self) -> PerformanceReport {
        let global = self.global_summary();
        let resources = self.resource_usage();
        let tools = self.all_tool_stats();

        let mut recommendations = Vec::new();
        let mut alerts = Vec::new();

        for tool in &tools {
            if tool.p95_ms > 1000.0 {
                recommendations.push(format!(
                    "consider caching results for '{}' (p95 {:.0}ms)",
                    tool.tool, tool.p95_ms
                ));
            }
            if tool.error_rate > 0.05 && tool.total_calls >= 10 {
                alerts.push(format!(
                    "'{}' error rate {:.1}% over {} calls",
                    tool.tool,
                    tool.error_rate * 100.0,
                    tool.total_calls
                ));
            }
        }

        if resources.rss_bytes > GIB {
            recommendations.push(format!(
                "optimize memory usage (resident {:.1} GiB)",
                resources.rss_bytes as f64 / GIB as f64
            ));
        }
        if global.error_rate > 0.05 && global.total_requests >= 10 {
            recommendations
                .push("investigate upstream sources: overall error rate above 5%".to_string());
        }
        if global.p95_ms > 2000.0 {
            alerts.push(format!("overall p95 at {:.0}ms", global.p95_ms));
        }

        PerformanceReport {
            summary: ReportSummary {
                generated_at: Utc::now(),
                global,
                resources,
            },
            tools,
            recommendations,
            alerts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::PerfConfig;

    #[test]
    fn slow_tool_triggers_caching_recommendation() {
        let monitor = PerformanceMonitor::new(PerfConfig::default());
        for _ in 0..20 {
            monitor.record("search_knowledge_base", 1500.0, false);
        }
        let report = monitor.generate_report();
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("consider caching") && r.contains("search_knowledge_base")));
    }

    #[test]
    fn error_heavy_tool_raises_report_alert() {
        let monitor = PerformanceMonitor::new(PerfConfig::default());
        for i in 0..20 {
            monitor.record("get_procedure", 50.0, i % 2 == 0);
        }
        let report = monitor.generate_report();
        assert!(report.alerts.iter().any(|a| a.contains("get_procedure")));
    }

    #[test]
    fn quiet_monitor_produces_clean_report() {
        let monitor = PerformanceMonitor::new(PerfConfig::default());
        monitor.record("list_sources", 5.0, false);
        let report = monitor.generate_report();
        assert!(report.recommendations.is_empty());
        assert!(report.alerts.is_empty());
        assert_eq!(report.tools.len(), 1);
    }
}
