//! Executor telemetry for observability and user feedback.
//!
//! Lock-free atomic counters updated by the executor as pipelines and tasks
//! move through their lifecycle, plus a point-in-time snapshot for display.
//!
//! # Architecture
//!
//! ```text
//! TaskGraphExecutor ─────► ExecutorMetrics ─────► TelemetrySnapshot ─────► Views
//!                          (atomic counters)      (point-in-time copy)      (CLI, etc.)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use installgraph::executor::TaskGraphExecutor;
//!
//! let executor = TaskGraphExecutor::default();
//! executor.run(root).await;
//!
//! let snapshot = executor.metrics().snapshot();
//! println!("Tasks succeeded: {}", snapshot.tasks_succeeded);
//! ```

mod metrics;
mod snapshot;

pub use metrics::ExecutorMetrics;
pub use snapshot::TelemetrySnapshot;
