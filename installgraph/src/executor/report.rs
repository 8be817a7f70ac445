//! Outcome of a pipeline run.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::failure::TaskFailure;

/// Final status of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    /// The root and every continuation succeeded.
    Succeeded,
    /// Something failed.
    Failed,
    /// Something failed after cancellation was requested.
    Cancelled,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Aggregate result of running one root task.
///
/// Side effects of tasks that succeeded (files on disk, for instance) are
/// kept whatever the status.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    /// Name of the submitted root.
    pub root: String,
    pub status: PipelineStatus,
    /// Every failure, in the order tasks reached `Failed`.
    pub failures: Vec<TaskFailure>,
    /// Nodes (tasks and meta nodes) that succeeded during this run.
    pub tasks_succeeded: usize,
    /// Nodes that failed during this run.
    pub tasks_failed: usize,
    pub duration: Duration,
}

impl PipelineReport {
    /// Returns true if the pipeline succeeded.
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    /// Returns the failure that explains the pipeline's outcome.
    ///
    /// This is the first failure that originated at a task rather than one
    /// that merely gave up because a dependency failed.
    pub fn root_cause(&self) -> Option<&TaskFailure> {
        self.failures
            .iter()
            .find(|failure| !failure.is_dependency_failure())
            .or_else(|| self.failures.first())
    }

    /// Converts the report into a `Result` carrying the root cause.
    pub fn into_result(self) -> Result<(), PipelineError> {
        if self.is_success() {
            return Ok(());
        }

        let cause = self.root_cause().cloned().unwrap_or_else(|| TaskFailure::DependencyFailure {
            task: self.root.clone(),
            failed: Vec::new(),
        });
        Err(PipelineError {
            stage: cause.task().to_string(),
            cause,
        })
    }
}

/// A failed pipeline, reduced to the stage that broke and why.
#[derive(Debug, Error)]
#[error("{stage} failed: {cause}")]
pub struct PipelineError {
    /// Name of the task where the failure originated.
    pub stage: String,
    /// The originating failure, with its source chain.
    #[source]
    pub cause: TaskFailure,
}
