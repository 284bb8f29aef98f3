//! Scoped operation timers with threshold warnings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

use super::MemoryProbe;

/// Operation name the controller uses for one code-display cycle.
///
/// Cycles slower than [`PerformanceThresholds::display_cycle`] warn as
/// cache-slow.
pub const DISPLAY_CYCLE_OP: &str = "code_display";

/// Breach thresholds. Breaches emit a warning and never alter control flow.
#[derive(Debug, Clone)]
pub struct PerformanceThresholds {
    /// An operation slower than this is reported as slow.
    pub slow_op: Duration,
    /// A per-op RSS growth above this many megabytes is reported.
    pub memory_delta_mb: f64,
    /// Ceiling for one code-display cycle.
    pub display_cycle: Duration,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            slow_op: Duration::from_secs(1),
            memory_delta_mb: 50.0,
            display_cycle: Duration::from_millis(200),
        }
    }
}

/// Live context returned by [`PerformanceMonitor::start`].
#[derive(Debug)]
pub struct OpContext {
    operation: String,
    started: Instant,
    memory_before_mb: f64,
}

/// Metrics for one finished operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OpMetrics {
    pub operation: String,
    pub duration: Duration,
    pub memory_delta_mb: f64,
}

/// Accumulated statistics for one operation name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpSummary {
    pub count: u64,
    pub total_seconds: f64,
    pub max_seconds: f64,
    pub avg_seconds: f64,
    pub total_memory_mb: f64,
    pub max_memory_mb: f64,
}

/// Monitor accumulating `{count, total, max, avg}` per operation.
///
/// Interior-mutable behind a lock so one instance can be shared by handle
/// between the controller, the differ and the adapters.
pub struct PerformanceMonitor {
    ops: Mutex<HashMap<String, OpSummary>>,
    probe: MemoryProbe,
    thresholds: PerformanceThresholds,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_thresholds(PerformanceThresholds::default())
    }

    pub fn with_thresholds(thresholds: PerformanceThresholds) -> Self {
        Self {
            ops: Mutex::new(HashMap::new()),
            probe: MemoryProbe::new(),
            thresholds,
        }
    }

    /// Begin timing an operation.
    pub fn start(&self, operation: impl Into<String>) -> OpContext {
        OpContext {
            operation: operation.into(),
            started: Instant::now(),
            memory_before_mb: self.probe.rss_mb(),
        }
    }

    /// Finish timing, record the metrics, and warn on threshold breaches.
    pub fn end(&self, ctx: OpContext) -> OpMetrics {
        let duration = ctx.started.elapsed();
        let memory_delta_mb = self.probe.rss_mb() - ctx.memory_before_mb;
        let metrics = OpMetrics {
            operation: ctx.operation,
            duration,
            memory_delta_mb,
        };

        {
            let mut ops = self.ops.lock().expect("monitor lock poisoned");
            let summary = ops.entry(metrics.operation.clone()).or_default();
            let seconds = duration.as_secs_f64();
            summary.count += 1;
            summary.total_seconds += seconds;
            summary.max_seconds = summary.max_seconds.max(seconds);
            summary.avg_seconds = summary.total_seconds / summary.count as f64;
            summary.total_memory_mb += memory_delta_mb;
            summary.max_memory_mb = summary.max_memory_mb.max(memory_delta_mb);
        }

        if metrics.operation == DISPLAY_CYCLE_OP {
            if duration > self.thresholds.display_cycle {
                warn!(
                    op = %metrics.operation,
                    ms = duration.as_millis() as u64,
                    "slow code-display cycle"
                );
            }
        } else if duration > self.thresholds.slow_op {
            warn!(
                op = %metrics.operation,
                seconds = duration.as_secs_f64(),
                "slow operation"
            );
        }
        if memory_delta_mb > self.thresholds.memory_delta_mb {
            warn!(
                op = %metrics.operation,
                delta_mb = memory_delta_mb,
                "high memory usage"
            );
        }

        metrics
    }

    /// Time a closure under the given operation name.
    pub fn time<T>(&self, operation: &str, f: impl FnOnce() -> T) -> T {
        let ctx = self.start(operation);
        let result = f();
        self.end(ctx);
        result
    }

    /// Per-operation summary statistics.
    pub fn summary(&self) -> HashMap<String, OpSummary> {
        self.ops.lock().expect("monitor lock poisoned").clone()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
