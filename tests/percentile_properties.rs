//! Property tests for the performance monitor's percentile computation.

use pagepilot_perf::{PerfConfig, PerformanceMonitor};
use proptest::prelude::*;

proptest! {
    /// For any sample set, nearest-rank percentiles are monotone:
    /// min ≤ p50 ≤ p95 ≤ p99 ≤ max.
    #[test]
    fn percentiles_are_monotone(durations in proptest::collection::vec(0.0f64..10_000.0, 1..300)) {
        let monitor = PerformanceMonitor::new(PerfConfig::default());
        for duration in &durations {
            monitor.record("prop_tool", *duration, false);
        }

        let stats = monitor.tool_stats("prop_tool").unwrap();
        let min = durations.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        prop_assert!(min <= stats.p50_ms);
        prop_assert!(stats.p50_ms <= stats.p95_ms);
        prop_assert!(stats.p95_ms <= stats.p99_ms);
        prop_assert!(stats.p99_ms <= max);
    }

    /// Every percentile is an actual observed sample (nearest rank never
    /// interpolates).
    #[test]
    fn percentiles_are_observed_samples(durations in proptest::collection::vec(0.0f64..10_000.0, 1..100)) {
        let monitor = PerformanceMonitor::new(PerfConfig::default());
        for duration in &durations {
            monitor.record("prop_tool", *duration, false);
        }
        let stats = monitor.tool_stats("prop_tool").unwrap();
        for p in [stats.p50_ms, stats.p95_ms, stats.p99_ms] {
            prop_assert!(durations.iter().any(|d| (d - p).abs() < 1e-9));
        }
    }

    /// Aggregates track every recorded sample even when the ring is full.
    #[test]
    fn totals_count_all_samples(count in 1usize..400, errors in 0usize..50) {
        let monitor = PerformanceMonitor::new(PerfConfig { max_samples: 64, window_seconds: 300 });
        let errors = errors.min(count);
        for i in 0..count {
            monitor.record("prop_tool", 10.0, i < errors);
        }
        let stats = monitor.tool_stats("prop_tool").unwrap();
        prop_assert_eq!(stats.total_calls, count as u64);
        prop_assert_eq!(stats.error_count, errors as u64);
    }
}
