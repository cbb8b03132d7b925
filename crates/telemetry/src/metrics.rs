//! Per-run stage timings.
//!
//! A `StageTimings` is created by each run, filled as stages complete, and
//! logged at the end. There is no global registry.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Wall-clock duration of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed_ms: u64,
}

/// Ordered list of stage durations for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    stages: Vec<StageTiming>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an already measured duration.
    pub fn record(&mut self, stage: &'static str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis().min(u64::MAX as u128) as u64;
        debug!(stage, elapsed_ms, "Stage complete");
        self.stages.push(StageTiming { stage, elapsed_ms });
    }

    /// Runs `f`, records how long it took under `stage`, and returns its value.
    pub fn time<T>(&mut self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let value = f();
        self.record(stage, started.elapsed());
        value
    }

    pub fn stages(&self) -> &[StageTiming] {
        &self.stages
    }

    pub fn total_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.elapsed_ms).sum()
    }

    /// Slowest stage, if any were recorded.
    pub fn slowest(&self) -> Option<&StageTiming> {
        self.stages.iter().max_by_key(|s| s.elapsed_ms)
    }
}
