//! Atomic executor counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::TelemetrySnapshot;

/// Counters shared by every pipeline an executor runs.
#[derive(Debug)]
pub struct ExecutorMetrics {
    started_at: Instant,
    pipelines_started: AtomicU64,
    pipelines_succeeded: AtomicU64,
    pipelines_failed: AtomicU64,
    tasks_started: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_cancelled: AtomicU64,
    tasks_running: AtomicU64,
}

impl ExecutorMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            pipelines_started: AtomicU64::new(0),
            pipelines_succeeded: AtomicU64::new(0),
            pipelines_failed: AtomicU64::new(0),
            tasks_started: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            tasks_running: AtomicU64::new(0),
        }
    }

    pub(crate) fn pipeline_started(&self) {
        self.pipelines_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn pipeline_finished(&self, succeeded: bool) {
        if succeeded {
            self.pipelines_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pipelines_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A task body started running.
    pub(crate) fn task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
        self.tasks_running.fetch_add(1, Ordering::Relaxed);
    }

    /// A task body stopped running, whatever the outcome.
    pub(crate) fn task_stopped(&self) {
        self.tasks_running.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn task_succeeded(&self) {
        self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started_at.elapsed(),
            pipelines_started: self.pipelines_started.load(Ordering::Relaxed),
            pipelines_succeeded: self.pipelines_succeeded.load(Ordering::Relaxed),
            pipelines_failed: self.pipelines_failed.load(Ordering::Relaxed),
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            tasks_running: self.tasks_running.load(Ordering::Relaxed),
        }
    }
}

impl Default for ExecutorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
