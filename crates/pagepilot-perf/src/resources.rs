//! Process resource usage.

use serde::Serialize;
use std::sync::Mutex;
use sysinfo::{Pid, System};

/// Resident/virtual memory and a coarse CPU estimate.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourceUsage {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
    /// Percent of one core since the previous sample; 0 on the first.
    pub cpu_percent: f32,
}

/// Samples the current process through `sysinfo`.
///
/// CPU usage is a delta measure, so the sampler keeps the `System` handle
/// alive between calls.
pub struct ResourceSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ResourceSampler {
    /// Creates a sampler for the current process.
    pub fn new() -> Self {
        ResourceSampler {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Takes a sample. Returns zeros when the process cannot be inspected.
    pub fn sample(&self) -> ResourceUsage {
        let Some(pid) = self.pid else {
            return ResourceUsage {
                rss_bytes: 0,
                virtual_bytes: 0,
                cpu_percent: 0.0,
            };
        };
        let mut system = self.system.lock().expect("resource sampler poisoned");
        system.refresh_process(pid);
        match system.process(pid) {
            Some(process) => ResourceUsage {
                rss_bytes: process.memory(),
                virtual_bytes: process.virtual_memory(),
                cpu_percent: process.cpu_usage(),
            },
            None => ResourceUsage {
                rss_bytes: 0,
                virtual_bytes: 0,
                cpu_percent: 0.0,
            },
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_own_process_reports_memory() {
        let sampler = ResourceSampler::new();
        let usage = sampler.sample();
        assert!(usage.rss_bytes > 0);
    }
}
