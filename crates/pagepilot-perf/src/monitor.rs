//! The sliding-window monitor.

use crate::resources::{ResourceSampler, ResourceUsage};
use chrono::{DateTime, Utc};
use pagepilot_core::{ComponentEvent, EventListener, EventListeners};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monitor settings.
#[derive(Debug, Clone)]
pub struct PerfConfig {
    /// Ring size per tool; older samples fall off when it overflows.
    pub max_samples: usize,
    /// Window used for throughput computation.
    pub window_seconds: u64,
}

impl Default for PerfConfig {
    fn default() -> Self {
        PerfConfig {
            max_samples: 1000,
            window_seconds: 300,
        }
    }
}

/// Aggregate view of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStats {
    pub tool: String,
    pub total_calls: u64,
    pub total_time_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub error_count: u64,
    pub error_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_called: Option<DateTime<Utc>>,
}

/// Aggregate view across every tool.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
    pub throughput_rps: f64,
    pub uptime_seconds: u64,
}

/// One realtime snapshot delivered to subscribers.
#[derive(Debug, Clone)]
pub struct PerfTick {
    pub at: Instant,
    pub summary: GlobalSummary,
    pub tools: Vec<ToolStats>,
}

impl ComponentEvent for PerfTick {
    fn event_type(&self) -> &'static str {
        "perf_tick"
    }

    fn timestamp(&self) -> Instant {
        self.at
    }

    fn component(&self) -> &str {
        "performance-monitor"
    }
}

struct ToolRing {
    durations: VecDeque<f64>,
    total_calls: u64,
    total_time_ms: f64,
    error_count: u64,
    last_called: Option<DateTime<Utc>>,
}

impl ToolRing {
    fn new() -> Self {
        ToolRing {
            durations: VecDeque::new(),
            total_calls: 0,
            total_time_ms: 0.0,
            error_count: 0,
            last_called: None,
        }
    }
}

/// Process-wide performance monitor.
pub struct PerformanceMonitor {
    config: PerfConfig,
    rings: Mutex<HashMap<String, ToolRing>>,
    started_at: Instant,
    sampler: ResourceSampler,
    subscribers: Mutex<EventListeners<PerfTick>>,
    realtime_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PerformanceMonitor {
    /// Creates a monitor.
    pub fn new(config: PerfConfig) -> Self {
        PerformanceMonitor {
            config,
            rings: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
            sampler: ResourceSampler::new(),
            subscribers: Mutex::new(EventListeners::new()),
            realtime_task: Mutex::new(None),
        }
    }

    /// Records one sample for `tool`.
    pub fn record(&self, tool: &str, duration_ms: f64, is_error: bool) {
        let mut rings = self.rings.lock().expect("perf rings poisoned");
        let ring = rings
            .entry(tool.to_string())
            .or_insert_with(ToolRing::new);
        ring.total_calls += 1;
        ring.total_time_ms += duration_ms;
        ring.last_called = Some(Utc::now());
        if is_error {
            ring.error_count += 1;
        }
        ring.durations.push_back(duration_ms);
        while ring.durations.len() > self.config.max_samples {
            ring.durations.pop_front();
        }
    }

    /// Stats for one tool, when it has been called.
    pub fn tool_stats(&self, tool: &str) -> Option<ToolStats> {
        let rings = self.rings.lock().expect("perf rings poisoned");
        rings.get(tool).map(|ring| stats_for(tool, ring))
    }

    /// Stats for every tool, sorted by name.
    pub fn all_tool_stats(&self) -> Vec<ToolStats> {
        let rings = self.rings.lock().expect("perf rings poisoned");
        let mut stats: Vec<ToolStats> = rings
            .iter()
            .map(|(tool, ring)| stats_for(tool, ring))
            .collect();
        stats.sort_by(|a, b| a.tool.cmp(&b.tool));
        stats
    }

    /// Union summary across every tool's ring.
    pub fn global_summary(&self) -> GlobalSummary {
        let rings = self.rings.lock().expect("perf rings poisoned");
        let mut durations: Vec<f64> = Vec::new();
        let mut total_requests = 0u64;
        let mut total_errors = 0u64;
        let mut total_time = 0.0f64;
        for ring in rings.values() {
            durations.extend(ring.durations.iter().copied());
            total_requests += ring.total_calls;
            total_errors += ring.error_count;
            total_time += ring.total_time_ms;
        }
        drop(rings);

        durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let uptime = self.started_at.elapsed().as_secs();
        let window = uptime.min(self.config.window_seconds).max(1);

        GlobalSummary {
            total_requests,
            total_errors,
            error_rate: if total_requests > 0 {
                total_errors as f64 / total_requests as f64
            } else {
                0.0
            },
            avg_ms: if total_requests > 0 {
                total_time / total_requests as f64
            } else {
                0.0
            },
            p50_ms: percentile(&durations, 50.0),
            p95_ms: percentile(&durations, 95.0),
            p99_ms: percentile(&durations, 99.0),
            max_ms: durations.last().copied().unwrap_or(0.0),
            min_ms: durations.first().copied().unwrap_or(0.0),
            throughput_rps: total_requests as f64 / window as f64,
            uptime_seconds: uptime,
        }
    }

    /// Resident/virtual memory and a coarse CPU estimate for the process.
    pub fn resource_usage(&self) -> ResourceUsage {
        self.sampler.sample()
    }

    /// Seconds since the monitor started.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Registers a realtime subscriber.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: EventListener<PerfTick> + 'static,
    {
        self.subscribers
            .lock()
            .expect("perf subscribers poisoned")
            .add(listener);
    }

    /// Starts the realtime loop: every `interval`, a snapshot is taken and
    /// fanned out to subscribers. A panicking subscriber is logged and does
    /// not abort the tick. Restarting replaces the previous loop.
    pub fn start_realtime(self: Arc<Self>, interval: Duration) {
        let monitor = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let snapshot = PerfTick {
                    at: Instant::now(),
                    summary: monitor.global_summary(),
                    tools: monitor.all_tool_stats(),
                };
                let subscribers = monitor
                    .subscribers
                    .lock()
                    .expect("perf subscribers poisoned")
                    .clone();
                subscribers.emit(&snapshot);
            }
        });
        if let Some(previous) = self
            .realtime_task
            .lock()
            .expect("realtime task poisoned")
            .replace(task)
        {
            previous.abort();
        }
    }

    /// Stops the realtime loop.
    pub fn stop_realtime(&self) {
        if let Some(task) = self
            .realtime_task
            .lock()
            .expect("realtime task poisoned")
            .take()
        {
            task.abort();
        }
    }

    /// Clears every ring, aggregate and error counter.
    pub fn reset(&self) {
        self.rings.lock().expect("perf rings poisoned").clear();
        tracing::info!("performance monitor reset");
    }
}

fn stats_for(tool: &str, ring: &ToolRing) -> ToolStats {
    let mut sorted: Vec<f64> = ring.durations.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    ToolStats {
        tool: tool.to_string(),
        total_calls: ring.total_calls,
        total_time_ms: ring.total_time_ms,
        avg_ms: if ring.total_calls > 0 {
            ring.total_time_ms / ring.total_calls as f64
        } else {
            0.0
        },
        p50_ms: percentile(&sorted, 50.0),
        p95_ms: percentile(&sorted, 95.0),
        p99_ms: percentile(&sorted, 99.0),
        error_count: ring.error_count,
        error_rate: if ring.total_calls > 0 {
            ring.error_count as f64 / ring.total_calls as f64
        } else {
            0.0
        },
        last_called: ring.last_called,
    }
}

/// Nearest-rank percentile over an ascending-sorted slice:
/// index `ceil(p/100 * n) - 1`, clamped to `[0, n-1]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    sorted[index]
}
