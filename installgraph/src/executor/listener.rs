//! Lifecycle and progress notifications.
//!
//! A [`TaskListener`] is a push-only sink: the executor calls it as tasks
//! move through their states and as bodies report progress. Listeners have
//! no influence on scheduling, and every method defaults to a no-op.

use std::sync::Arc;

use super::failure::TaskFailure;
use super::handle::TaskId;
use super::report::PipelineReport;
use super::task::Significance;

/// Identifies the task a notification is about.
#[derive(Clone, Debug)]
pub struct TaskInfo {
    /// Unique task identifier.
    pub id: TaskId,
    /// Task name.
    pub name: Arc<str>,
    /// Reporting significance.
    pub significance: Significance,
}

/// Receives task lifecycle and progress events.
pub trait TaskListener: Send + Sync {
    /// All dependencies of the task are terminal.
    fn on_ready(&self, _task: &TaskInfo) {}

    /// The task body is about to run.
    fn on_running(&self, _task: &TaskInfo) {}

    /// The task reached `Succeeded`.
    fn on_succeeded(&self, _task: &TaskInfo) {}

    /// The task reached `Failed`.
    fn on_failed(&self, _task: &TaskInfo, _failure: &TaskFailure) {}

    /// The task body reported progress.
    fn on_progress(&self, _task: &TaskInfo, _current: u64, _total: u64) {}

    /// A pipeline finished, including all of its continuations.
    fn on_pipeline_finished(&self, _report: &PipelineReport) {}
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl TaskListener for NoopListener {}
