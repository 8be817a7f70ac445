//! Task trait and related types.
//!
//! A task is a single async operation in a pipeline. It declares the tasks it
//! depends on, runs once they are all terminal, and may hand follow-up work
//! back to the executor after it succeeds.
//!
//! # Example
//!
//! ```ignore
//! use installgraph::executor::{BoxFuture, Task, TaskContext, TaskError, TaskHandle};
//!
//! struct InstallJar {
//!     jar: TaskHandle,
//! }
//!
//! impl Task for InstallJar {
//!     fn name(&self) -> &str { "Install client jar" }
//!
//!     fn dependencies(&self) -> Vec<TaskHandle> {
//!         vec![self.jar.clone()]
//!     }
//!
//!     fn execute<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
//!         Box::pin(async move {
//!             if !ctx.dependencies_succeeded() {
//!                 return Err(TaskError::new("client jar was not downloaded"));
//!             }
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use super::context::TaskContext;
use super::handle::TaskHandle;

/// Boxed future returned by task bodies.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unit of work in a task graph.
///
/// # Dependencies
///
/// [`dependencies`](Task::dependencies) is called once per resolution pass,
/// before anything runs. It may inspect runtime state, for example to depend
/// on an index download only when the index file is missing.
///
/// # Failure
///
/// The executor never retries a body. A body that wants retries performs
/// them itself, typically with a [`RetryPolicy`](super::RetryPolicy).
pub trait Task: Send + Sync + 'static {
    /// Returns a human-readable name for logging and failure reports.
    fn name(&self) -> &str;

    /// Returns the tasks that must be terminal before this one runs.
    fn dependencies(&self) -> Vec<TaskHandle> {
        Vec::new()
    }

    /// Executes the task body.
    ///
    /// Called once, after every dependency is terminal. The body must check
    /// [`TaskContext::dependencies_succeeded`] before trusting dependency
    /// output.
    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>>;

    /// Returns follow-up tasks produced by a successful execution.
    ///
    /// Read once after the body succeeds. Each returned task is scheduled as
    /// a new root in the same pipeline.
    fn continuations(&self) -> Vec<TaskHandle> {
        Vec::new()
    }

    /// Returns how prominently this task is logged and displayed.
    fn significance(&self) -> Significance {
        Significance::Major
    }
}

/// How prominently a task is reported.
///
/// Bulk tasks (one per asset object, say) are `Minor` so they do not flood
/// the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Significance {
    /// Logged and shown to the user.
    #[default]
    Major,
    /// Logged but not shown.
    Moderate,
    /// Neither logged nor shown individually.
    Minor,
}

impl Significance {
    /// Returns true if task lifecycle events should be logged.
    pub fn should_log(self) -> bool {
        !matches!(self, Self::Minor)
    }

    /// Returns true if the task should appear in user-facing progress.
    pub fn should_show(self) -> bool {
        matches!(self, Self::Major)
    }
}

/// Classification of a [`TaskError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The failure will not go away by trying again.
    Permanent,
    /// The failure may succeed on another attempt.
    Transient,
    /// The body stopped because cancellation was requested.
    Cancelled,
}

/// Error type for task failures.
#[derive(Debug)]
pub struct TaskError {
    /// Human-readable error message.
    message: String,
    kind: ErrorKind,
    /// Optional source error.
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TaskError {
    /// Creates a new task error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Permanent,
            source: None,
        }
    }

    /// Creates a new transient (retryable) error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            ..Self::new(message)
        }
    }

    /// Creates an error for a body that observed cancellation.
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            ..Self::new("cancelled")
        }
    }

    /// Creates an error for missing input from a previous task.
    pub fn missing_input(key: &str) -> Self {
        Self::new(format!("Missing required input: {}", key))
    }

    /// Attaches a source error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns true if this error is transient (retryable).
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    /// Returns true if the body stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &_)
    }
}

// Note: We don't provide a blanket From<E> implementation to avoid conflicts.
// Use TaskError::new(err.to_string()).with_source(err) explicitly instead.

/// A task whose body is a closure.
///
/// Handy for glue steps and tests. Build one with [`TaskHandle::from_fn`].
pub struct FnTask<F> {
    name: String,
    dependencies: Vec<TaskHandle>,
    significance: Significance,
    body: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    /// Creates a closure task with no dependencies.
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            significance: Significance::Major,
            body,
        }
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, dependency: TaskHandle) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Replaces the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<TaskHandle>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the reporting significance.
    pub fn with_significance(mut self, significance: Significance) -> Self {
        self.significance = significance;
        self
    }
}

impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskHandle> {
        self.dependencies.clone()
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin((self.body)(ctx.clone()))
    }

    fn significance(&self) -> Significance {
        self.significance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_task_error_new() {
        let err = TaskError::new("something went wrong");
        assert_eq!(err.message(), "something went wrong");
        assert!(!err.is_transient());
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_task_error_transient() {
        let err = TaskError::transient("network timeout");
        assert_eq!(err.message(), "network timeout");
        assert!(err.is_transient());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_task_error_cancelled() {
        let err = TaskError::cancelled();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn test_task_error_missing_input() {
        let err = TaskError::missing_input("url");
        assert!(err.message().contains("url"));
        assert!(err.message().contains("Missing"));
    }

    #[test]
    fn test_task_error_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = TaskError::new("failed to read index").with_source(io);
        assert_eq!(err.source().unwrap().to_string(), "no such file");
    }

    #[test]
    fn test_significance_flags() {
        assert!(Significance::Major.should_log());
        assert!(Significance::Major.should_show());
        assert!(Significance::Moderate.should_log());
        assert!(!Significance::Moderate.should_show());
        assert!(!Significance::Minor.should_log());
        assert_eq!(Significance::default(), Significance::Major);
    }

    #[test]
    fn test_fn_task_metadata() {
        let dep = TaskHandle::from_fn("dep", |_ctx| async { Ok(()) });
        let task = FnTask::new("glue", |_ctx| async { Ok(()) })
            .depends_on(dep.clone())
            .with_significance(Significance::Minor);

        assert_eq!(task.name(), "glue");
        assert_eq!(task.dependencies().len(), 1);
        assert_eq!(task.dependencies()[0].id(), dep.id());
        assert_eq!(task.significance(), Significance::Minor);
        assert!(task.continuations().is_empty());
    }
}
