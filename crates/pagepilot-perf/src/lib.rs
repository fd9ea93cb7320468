//! Per-tool performance monitoring.
//!
//! The monitor keeps a bounded ring of recent call durations per tool and
//! derives percentiles with the nearest-rank method over a sorted copy, so
//! recorders never contend with readers for more than a snapshot. A realtime
//! loop can fan periodic snapshots out to subscribers, and
//! [`PerformanceMonitor::generate_report`] folds everything into an
//! operator-facing report with threshold-derived recommendations.

mod monitor;
mod report;
mod resources;

pub use monitor::{
    GlobalSummary, PerfConfig, PerfTick, PerformanceMonitor, ToolStats,
};
pub use report::{PerformanceReport, ReportSummary};
pub use resources::{ResourceUsage, ResourceSampler};
