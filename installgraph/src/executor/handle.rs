//! Task graph nodes and the handles that share them.
//!
//! Every node in a pipeline is reached through a [`TaskHandle`]. A node is
//! one of three kinds:
//!
//! ```text
//! Task      user body with its own dependencies
//! Group     body-less meta node, succeeds iff all members succeed
//! Sequence  ordered steps, each run as a root after the previous succeeded
//! ```
//!
//! Nodes are single-use. Once a node is terminal its state, failure and
//! outcome never change; submitting it again reports the stored outcome.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::context::TaskContext;
use super::failure::TaskFailure;
use super::listener::TaskInfo;
use super::task::{FnTask, Significance, Task, TaskError};

/// Global counter for task identifiers.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Not started.
    Pending,
    /// Dependencies done, body in progress.
    Running,
    /// Terminal: completed successfully.
    Succeeded,
    /// Terminal: failed, cancelled, or gave up on a failed dependency.
    Failed,
}

impl TaskState {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub(crate) enum NodeKind {
    Task(Box<dyn Task>),
    Group { name: String, members: Vec<TaskHandle> },
    Sequence { name: String, steps: Vec<TaskHandle> },
}

pub(crate) struct TaskNode {
    id: TaskId,
    kind: NodeKind,
    state: Mutex<TaskState>,
    failure: OnceLock<TaskFailure>,
    /// Set once by the run that drives this node; later runs read it.
    completion: OnceCell<bool>,
}

/// Shared reference to a node in a task graph.
///
/// Clones point at the same node, so one download can be a dependency of
/// several tasks and still run once.
#[derive(Clone)]
pub struct TaskHandle {
    node: Arc<TaskNode>,
}

impl TaskHandle {
    fn from_kind(kind: NodeKind) -> Self {
        Self {
            node: Arc::new(TaskNode {
                id: TaskId::next(),
                kind,
                state: Mutex::new(TaskState::Pending),
                failure: OnceLock::new(),
                completion: OnceCell::new(),
            }),
        }
    }

    /// Wraps a task.
    pub fn new(task: impl Task) -> Self {
        Self::from_kind(NodeKind::Task(Box::new(task)))
    }

    /// Wraps a closure as a task with no dependencies.
    pub fn from_fn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self::new(FnTask::new(name, body))
    }

    /// Creates a body-less node that succeeds iff all `members` succeed.
    ///
    /// Members run concurrently. An empty group succeeds immediately.
    pub fn group(name: impl Into<String>, members: Vec<TaskHandle>) -> Self {
        Self::from_kind(NodeKind::Group {
            name: name.into(),
            members,
        })
    }

    /// Returns a node that runs `self`, then `next` once `self` succeeded.
    ///
    /// Chains flatten: `a.after(b).after(c)` is one sequence of three steps.
    /// If a step fails, the remaining steps are marked failed without
    /// running.
    pub fn after(self, next: TaskHandle) -> TaskHandle {
        let mut steps = match &self.node.kind {
            NodeKind::Sequence { steps, .. } if self.state() == TaskState::Pending => {
                steps.clone()
            }
            _ => vec![self.clone()],
        };
        steps.push(next);

        let name = steps
            .iter()
            .map(|step| step.name())
            .collect::<Vec<_>>()
            .join(" -> ");
        Self::from_kind(NodeKind::Sequence { name, steps })
    }

    /// Returns the node identifier.
    pub fn id(&self) -> TaskId {
        self.node.id
    }

    /// Returns the node name.
    pub fn name(&self) -> &str {
        match &self.node.kind {
            NodeKind::Task(task) => task.name(),
            NodeKind::Group { name, .. } | NodeKind::Sequence { name, .. } => name.as_str(),
        }
    }

    /// Returns the reporting significance.
    ///
    /// Meta nodes inherit `Moderate`: logged, not shown.
    pub fn significance(&self) -> Significance {
        match &self.node.kind {
            NodeKind::Task(task) => task.significance(),
            _ => Significance::Moderate,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> TaskState {
        *self.node.state.lock()
    }

    /// Returns true once the node is `Succeeded` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Returns true if the node succeeded.
    pub fn succeeded(&self) -> bool {
        self.state() == TaskState::Succeeded
    }

    /// Returns the stored failure of a failed node.
    pub fn failure(&self) -> Option<&TaskFailure> {
        self.node.failure.get()
    }

    /// Returns the steps of a sequence node, or an empty slice.
    pub fn steps(&self) -> &[TaskHandle] {
        match &self.node.kind {
            NodeKind::Sequence { steps, .. } => steps.as_slice(),
            _ => &[],
        }
    }

    pub(crate) fn kind(&self) -> &NodeKind {
        &self.node.kind
    }

    /// Evaluates the node's dependency list.
    ///
    /// Sequence steps are not dependencies; they run as separate roots.
    pub(crate) fn dependencies(&self) -> Vec<TaskHandle> {
        match &self.node.kind {
            NodeKind::Task(task) => task.dependencies(),
            NodeKind::Group { members, .. } => members.clone(),
            NodeKind::Sequence { .. } => Vec::new(),
        }
    }

    pub(crate) fn completion(&self) -> &OnceCell<bool> {
        &self.node.completion
    }

    pub(crate) fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id(),
            name: Arc::from(self.name()),
            significance: self.significance(),
        }
    }

    pub(crate) fn mark_running(&self) {
        let mut state = self.node.state.lock();
        if *state == TaskState::Pending {
            *state = TaskState::Running;
        }
    }

    /// Moves the node to its terminal state.
    ///
    /// Returns false if the node was already terminal, in which case
    /// nothing changes.
    pub(crate) fn mark_terminal(&self, outcome: &Result<(), TaskFailure>) -> bool {
        let mut state = self.node.state.lock();
        if state.is_terminal() {
            return false;
        }
        match outcome {
            Ok(()) => *state = TaskState::Succeeded,
            Err(failure) => {
                let _ = self.node.failure.set(failure.clone());
                *state = TaskState::Failed;
            }
        }
        true
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
