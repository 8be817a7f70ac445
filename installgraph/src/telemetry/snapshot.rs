//! Point-in-time view of executor counters.

use std::fmt;
use std::time::Duration;

/// Copy of [`ExecutorMetrics`](super::ExecutorMetrics) at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Time since the metrics were created.
    pub uptime: Duration,
    pub pipelines_started: u64,
    pub pipelines_succeeded: u64,
    pub pipelines_failed: u64,
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    /// Bodies running at snapshot time.
    pub tasks_running: u64,
}

impl TelemetrySnapshot {
    /// Returns the number of finished pipelines.
    pub fn pipelines_finished(&self) -> u64 {
        self.pipelines_succeeded + self.pipelines_failed
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tasks ok, {} failed, {} cancelled ({} running) in {:.1}s",
            self.tasks_succeeded,
            self.tasks_failed,
            self.tasks_cancelled,
            self.tasks_running,
            self.uptime.as_secs_f64()
        )
    }
}
