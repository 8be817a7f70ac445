//! Dependency-aware task executor.
//!
//! Pipelines are graphs of [`TaskHandle`]s. The executor resolves a root's
//! dependency tree, runs dependencies before dependents (concurrently where
//! possible), passes each body whether its dependencies succeeded, and
//! reports the first real failure as the pipeline's root cause.
//!
//! # Building blocks
//!
//! - [`Task`]: unit of work with lazy dependencies and optional continuations
//! - [`TaskHandle`]: shared node; [`TaskHandle::group`] and
//!   [`TaskHandle::after`] build meta nodes
//! - [`ResultSlot`]: write-once cell for passing a result to a dependent
//! - [`TaskGraphExecutor`]: runs pipelines, produces [`PipelineReport`]s
//! - [`TaskListener`]: lifecycle and progress sink
//!
//! # Example
//!
//! ```ignore
//! use installgraph::executor::{TaskGraphExecutor, TaskHandle};
//!
//! let index = TaskHandle::from_fn("fetch-index", |_ctx| async { Ok(()) });
//! let jar = TaskHandle::from_fn("fetch-jar", |_ctx| async { Ok(()) });
//! let install = TaskHandle::group("install", vec![index, jar])
//!     .after(TaskHandle::from_fn("write launcher profile", |_ctx| async { Ok(()) }));
//!
//! let report = TaskGraphExecutor::default().run(install).await;
//! report.into_result()?;
//! ```

mod context;
mod failure;
mod graph;
mod handle;
mod listener;
mod policy;
mod report;
mod scheduler;
mod slot;
mod task;

pub use context::TaskContext;
pub use failure::TaskFailure;
pub use handle::{TaskHandle, TaskId, TaskState};
pub use listener::{NoopListener, TaskInfo, TaskListener};
pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_INITIAL_DELAY_MS,
    DEFAULT_MAX_DELAY_SECS,
};
pub use report::{PipelineError, PipelineReport, PipelineStatus};
pub use scheduler::{
    ExecutorConfig, PipelineHandle, TaskGraphExecutor, DEFAULT_MAX_CONCURRENT_TASKS,
    MAX_CONCURRENT_TASKS,
};
pub use slot::ResultSlot;
pub use task::{BoxFuture, ErrorKind, FnTask, Significance, Task, TaskError};
