//! Execution context handed to task bodies.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::handle::TaskId;
use super::listener::{NoopListener, TaskInfo, TaskListener};
use super::task::Significance;

/// What a running task can see of the executor.
///
/// Cheap to clone, so closure bodies can move a copy into their future.
#[derive(Clone)]
pub struct TaskContext {
    info: TaskInfo,
    dependencies_succeeded: bool,
    cancellation: CancellationToken,
    listener: Arc<dyn TaskListener>,
}

impl TaskContext {
    pub(crate) fn new(
        info: TaskInfo,
        dependencies_succeeded: bool,
        cancellation: CancellationToken,
        listener: Arc<dyn TaskListener>,
    ) -> Self {
        Self {
            info,
            dependencies_succeeded,
            cancellation,
            listener,
        }
    }

    /// Creates a context outside any executor.
    ///
    /// Useful for driving a single task body directly, for example in tests.
    pub fn detached(name: impl Into<Arc<str>>, dependencies_succeeded: bool) -> Self {
        Self::new(
            TaskInfo {
                id: TaskId::next(),
                name: name.into(),
                significance: Significance::Major,
            },
            dependencies_succeeded,
            CancellationToken::new(),
            Arc::new(NoopListener),
        )
    }

    /// Returns a copy of this context observing a different cancellation token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Returns true if every direct dependency succeeded.
    ///
    /// Always true for a task without dependencies.
    pub fn dependencies_succeeded(&self) -> bool {
        self.dependencies_succeeded
    }

    /// Returns the running task's name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns the running task's identifier.
    pub fn task_id(&self) -> TaskId {
        self.info.id
    }

    /// Returns true if the pipeline has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the pipeline is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Returns the pipeline's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Reports `(current, total)` progress to the pipeline's listener.
    pub fn report_progress(&self, current: u64, total: u64) {
        self.listener.on_progress(&self.info, current, total);
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.info.name)
            .field("dependencies_succeeded", &self.dependencies_succeeded)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
