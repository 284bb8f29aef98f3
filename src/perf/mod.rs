//! Performance utilities shared across the review-session engine.
//!
//! - **ContentCache**: dual-capped LRU for code bodies and text diffs
//! - **PerformanceMonitor**: scoped timers with threshold warnings
//! - **LazyLoader**: deferred text loading with size estimates
//! - **ChunkedProcessor**: fixed-window iteration with memory checks
//!
//! None of these are global. The controller constructs them at session start
//! and threads them through calls by handle, so concurrent sessions stay
//! expressible.

mod cache;
mod chunked;
mod lazy;
mod monitor;

pub use cache::{CacheStats, ContentCache};
pub use chunked::{ChunkedProcessor, DEFAULT_CHUNK_SIZE, DEFAULT_MEMORY_LIMIT_MB};
pub use lazy::LazyLoader;
pub use monitor::{
    OpContext, OpMetrics, OpSummary, PerformanceMonitor, PerformanceThresholds, DISPLAY_CYCLE_OP,
};

use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Resident-set-size probe for the current process.
///
/// Shared by the monitor and the chunked processor; refreshing reuses one
/// `System` so repeated probes stay cheap.
pub struct MemoryProbe {
    system: Mutex<System>,
    pid: Pid,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    /// Current RSS in bytes; 0 when the platform withholds it.
    pub fn rss_bytes(&self) -> u64 {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    /// Current RSS in megabytes.
    pub fn rss_mb(&self) -> f64 {
        self.rss_bytes() as f64 / 1024.0 / 1024.0
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_probe_reports_something() {
        let probe = MemoryProbe::new();
        // A live process has a nonzero RSS on every supported platform.
        assert!(probe.rss_bytes() > 0);
    }
}
