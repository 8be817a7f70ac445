//! Task graph executor.
//!
//! The [`TaskGraphExecutor`] runs a root task and everything it depends on.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        TaskGraphExecutor                          │
//! │                                                                   │
//! │  root ──► ┌────────────┐                                          │
//! │           │  Resolve   │──► cycle ──► CyclicDependency (no runs)  │
//! │           └─────┬──────┘                                          │
//! │                 ▼                                                 │
//! │           ┌────────────┐   dependencies run concurrently,         │
//! │           │   Drive    │◄─ each node driven once (OnceCell)       │
//! │           └─────┬──────┘                                          │
//! │                 ▼                                                 │
//! │           ┌────────────┐   body gets dependencies_succeeded,      │
//! │           │  Execute   │── raced against cancellation             │
//! │           └─────┬──────┘                                          │
//! │                 ▼                                                 │
//! │           ┌────────────┐   continuations become new roots,        │
//! │           │   Finish   │── failures recorded in order             │
//! │           └─────┬──────┘                                          │
//! │                 ▼                                                 │
//! │           PipelineReport                                          │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Runs require a tokio runtime; dependencies and continuations are spawned
//! as tokio tasks.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::TaskContext;
use super::failure::TaskFailure;
use super::graph::{self, ResolvedGraph};
use super::handle::{NodeKind, TaskHandle};
use super::listener::{NoopListener, TaskInfo, TaskListener};
use super::report::{PipelineReport, PipelineStatus};
use super::task::{BoxFuture, Task, TaskError};
use crate::telemetry::ExecutorMetrics;

// =============================================================================
// Configuration
// =============================================================================

/// Default bound on simultaneously running task bodies.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 256;

/// Largest accepted bound on simultaneously running task bodies.
pub const MAX_CONCURRENT_TASKS: usize = 65_536;

/// Configuration for the task graph executor.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Maximum number of task bodies running at once.
    ///
    /// Meta nodes (groups, sequences) do not count.
    pub max_concurrent_tasks: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

impl ExecutorConfig {
    /// Sets the body concurrency bound, clamped to `1..=MAX_CONCURRENT_TASKS`.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.clamp(1, MAX_CONCURRENT_TASKS);
        self
    }
}

// =============================================================================
// Executor
// =============================================================================

struct ExecutorInner {
    config: ExecutorConfig,
    task_permits: Arc<Semaphore>,
    listener: Arc<dyn TaskListener>,
    metrics: Arc<ExecutorMetrics>,
}

/// Runs task graphs.
///
/// Cloning yields another handle to the same executor; clones share the
/// body concurrency bound, listener and metrics.
#[derive(Clone)]
pub struct TaskGraphExecutor {
    inner: Arc<ExecutorInner>,
}

impl TaskGraphExecutor {
    /// Creates an executor without a listener.
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_listener(config, Arc::new(NoopListener))
    }

    /// Creates an executor that reports to `listener`.
    pub fn with_listener(config: ExecutorConfig, listener: Arc<dyn TaskListener>) -> Self {
        let permits = config.max_concurrent_tasks.clamp(1, MAX_CONCURRENT_TASKS);
        Self {
            inner: Arc::new(ExecutorInner {
                config,
                task_permits: Arc::new(Semaphore::new(permits)),
                listener,
                metrics: Arc::new(ExecutorMetrics::new()),
            }),
        }
    }

    /// Returns the executor configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Returns the executor's metrics.
    pub fn metrics(&self) -> &Arc<ExecutorMetrics> {
        &self.inner.metrics
    }

    /// Runs `root` and its dependency graph to completion.
    pub async fn run(&self, root: TaskHandle) -> PipelineReport {
        self.run_with_cancellation(root, CancellationToken::new()).await
    }

    /// Runs `root`, stopping early when `cancellation` fires.
    ///
    /// Nodes that had not finished are marked failed with
    /// [`TaskFailure::Cancelled`]; completed side effects are kept.
    pub async fn run_with_cancellation(
        &self,
        root: TaskHandle,
        cancellation: CancellationToken,
    ) -> PipelineReport {
        let run = Arc::new(PipelineRun {
            executor: Arc::clone(&self.inner),
            cancellation,
            failures: Mutex::new(Vec::new()),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            continuations: Mutex::new(Vec::new()),
        });
        run.execute(root).await
    }

    /// Starts `root` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, root: TaskHandle) -> PipelineHandle {
        let cancellation = CancellationToken::new();
        let executor = self.clone();
        let token = cancellation.clone();
        let task = root.clone();
        let join = tokio::spawn(async move { executor.run_with_cancellation(task, token).await });

        PipelineHandle {
            root,
            cancellation,
            join,
        }
    }
}

impl Default for TaskGraphExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl std::fmt::Debug for TaskGraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraphExecutor")
            .field("config", &self.inner.config)
            .field("idle_permits", &self.inner.task_permits.available_permits())
            .finish()
    }
}

// =============================================================================
// Pipeline handle
// =============================================================================

/// Handle to a pipeline started with [`TaskGraphExecutor::submit`].
pub struct PipelineHandle {
    root: TaskHandle,
    cancellation: CancellationToken,
    join: JoinHandle<PipelineReport>,
}

impl PipelineHandle {
    /// Requests cancellation of the pipeline.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns the pipeline's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns the submitted root.
    pub fn root(&self) -> &TaskHandle {
        &self.root
    }

    /// Returns true once the pipeline has finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the pipeline to finish.
    pub async fn wait(self) -> PipelineReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) => {
                warn!(root = %self.root.name(), error = %e, "Pipeline worker stopped");
                let failure = TaskFailure::execution(
                    self.root.name(),
                    TaskError::new(format!("pipeline worker stopped: {}", e)),
                );
                PipelineReport {
                    root: self.root.name().to_string(),
                    status: PipelineStatus::Failed,
                    failures: vec![failure],
                    tasks_succeeded: 0,
                    tasks_failed: 0,
                    duration: Duration::ZERO,
                }
            }
        }
    }
}

// =============================================================================
// Pipeline run
// =============================================================================

/// State of one submitted root and its continuations.
struct PipelineRun {
    executor: Arc<ExecutorInner>,
    cancellation: CancellationToken,
    failures: Mutex<Vec<TaskFailure>>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    continuations: Mutex<Vec<JoinHandle<bool>>>,
}

impl PipelineRun {
    async fn execute(self: Arc<Self>, root: TaskHandle) -> PipelineReport {
        let started = Instant::now();
        self.executor.metrics.pipeline_started();
        info!(root = %root.name(), "Pipeline started");

        let mut ok = Arc::clone(&self).run_root(root.clone()).await;

        // Continuations may schedule more continuations.
        loop {
            let pending = std::mem::take(&mut *self.continuations.lock());
            if pending.is_empty() {
                break;
            }
            for handle in join_all(pending).await {
                ok &= handle.unwrap_or(false);
            }
        }

        let mut failures = std::mem::take(&mut *self.failures.lock());
        if !ok && failures.is_empty() {
            // Resubmitted terminal root: report its stored failure.
            failures.extend(root.failure().cloned());
        }
        // A failure anywhere in the closure fails the pipeline, even when
        // the root tolerated it.
        let ok = ok && failures.is_empty();

        let status = if ok {
            PipelineStatus::Succeeded
        } else if self.cancellation.is_cancelled() {
            PipelineStatus::Cancelled
        } else {
            PipelineStatus::Failed
        };

        let report = PipelineReport {
            root: root.name().to_string(),
            status,
            failures,
            tasks_succeeded: self.succeeded.load(Ordering::Acquire),
            tasks_failed: self.failed.load(Ordering::Acquire),
            duration: started.elapsed(),
        };

        self.executor.metrics.pipeline_finished(ok);
        if ok {
            info!(
                root = %report.root,
                tasks = report.tasks_succeeded,
                duration_ms = report.duration.as_millis() as u64,
                "Pipeline succeeded"
            );
        } else {
            let cause = report
                .root_cause()
                .map(|failure| format!("{}: {}", failure.task(), failure))
                .unwrap_or_default();
            warn!(
                root = %report.root,
                status = %report.status,
                failed = report.tasks_failed,
                cause = %cause,
                "Pipeline did not succeed"
            );
        }

        self.executor.listener.on_pipeline_finished(&report);
        report
    }

    /// Resolves and drives `root`. Returns true if it succeeded.
    fn run_root(self: Arc<Self>, root: TaskHandle) -> BoxFuture<'static, bool> {
        Box::pin(async move {
            let graph = match graph::resolve(&root) {
                Ok(graph) => Arc::new(graph),
                Err(failure) => {
                    warn!(root = %root.name(), error = %failure, "Dependency resolution failed");
                    let node = root.clone();
                    let run = Arc::clone(&self);
                    return *root
                        .completion()
                        .get_or_init(|| async move { run.finish(&node, Err(failure)) })
                        .await;
                }
            };

            debug!(root = %root.name(), nodes = graph.len(), "Dependencies resolved");
            self.run_node(graph, root).await
        })
    }

    /// Drives `node` unless another run already did.
    fn run_node(self: Arc<Self>, graph: Arc<ResolvedGraph>, node: TaskHandle) -> BoxFuture<'static, bool> {
        Box::pin(async move {
            let driver = node.clone();
            *node.completion().get_or_init(|| self.drive(graph, driver)).await
        })
    }

    fn drive(self: Arc<Self>, graph: Arc<ResolvedGraph>, node: TaskHandle) -> BoxFuture<'static, bool> {
        Box::pin(async move {
            if node.is_terminal() {
                return node.succeeded();
            }

            let dependencies = graph.dependencies_of(node.id()).to_vec();
            let dependencies_succeeded = self.await_dependencies(&graph, &dependencies).await;

            let info = node.info();
            self.executor.listener.on_ready(&info);

            if self.cancellation.is_cancelled() {
                let failure = TaskFailure::Cancelled {
                    task: node.name().to_string(),
                };
                return self.finish(&node, Err(failure));
            }

            let outcome = match node.kind() {
                NodeKind::Group { .. } => {
                    dependency_outcome(&node, &dependencies, dependencies_succeeded)
                }
                NodeKind::Sequence { steps, .. } => {
                    node.mark_running();
                    self.run_sequence(&node, steps).await
                }
                NodeKind::Task(task) => {
                    self.run_task(&node, task.as_ref(), info, dependencies_succeeded)
                        .await
                }
            };

            self.finish(&node, outcome)
        })
    }

    /// Runs every dependency concurrently and returns the AND of their outcomes.
    async fn await_dependencies(
        self: &Arc<Self>,
        graph: &Arc<ResolvedGraph>,
        dependencies: &[TaskHandle],
    ) -> bool {
        if dependencies.is_empty() {
            return true;
        }

        let pending = dependencies.iter().map(|dependency| {
            tokio::spawn(Arc::clone(self).run_node(Arc::clone(graph), dependency.clone()))
        });

        join_all(pending)
            .await
            .into_iter()
            .fold(true, |all, joined| all & joined.unwrap_or(false))
    }

    async fn run_task(
        self: &Arc<Self>,
        node: &TaskHandle,
        task: &dyn Task,
        info: TaskInfo,
        dependencies_succeeded: bool,
    ) -> Result<(), TaskFailure> {
        let name = node.name().to_string();

        let permit = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                return Err(TaskFailure::Cancelled { task: name.clone() });
            }
            permit = Arc::clone(&self.executor.task_permits).acquire_owned() => permit,
        };
        let Ok(_permit) = permit else {
            return Err(TaskFailure::execution(name, TaskError::new("executor is shut down")));
        };

        node.mark_running();
        self.executor.listener.on_running(&info);
        let significance = task.significance();
        if significance.should_log() {
            debug!(task = %name, id = %info.id, dependencies_succeeded, "Task running");
        }

        let ctx = TaskContext::new(
            info,
            dependencies_succeeded,
            self.cancellation.clone(),
            Arc::clone(&self.executor.listener),
        );

        self.executor.metrics.task_started();
        let body = AssertUnwindSafe(task.execute(&ctx)).catch_unwind();
        let result = tokio::select! {
            biased;
            outcome = body => match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) if error.is_cancelled() => {
                    Err(TaskFailure::Cancelled { task: name.clone() })
                }
                Ok(Err(error)) => Err(TaskFailure::execution(name.clone(), error)),
                Err(_) => Err(TaskFailure::execution(name.clone(), TaskError::new("task panicked"))),
            },
            _ = self.cancellation.cancelled() => Err(TaskFailure::Cancelled { task: name.clone() }),
        };
        self.executor.metrics.task_stopped();

        if result.is_ok() {
            for continuation in task.continuations() {
                self.schedule_continuation(continuation);
            }
        }

        result
    }

    /// Runs each step as a root, stopping at the first failure.
    async fn run_sequence(
        self: &Arc<Self>,
        node: &TaskHandle,
        steps: &[TaskHandle],
    ) -> Result<(), TaskFailure> {
        let mut failed_step: Option<String> = None;

        for step in steps {
            match &failed_step {
                None => {
                    if !Arc::clone(self).run_root(step.clone()).await {
                        failed_step = Some(step.name().to_string());
                    }
                }
                Some(failed) => {
                    let failure = if self.cancellation.is_cancelled() {
                        TaskFailure::Cancelled {
                            task: step.name().to_string(),
                        }
                    } else {
                        TaskFailure::DependencyFailure {
                            task: step.name().to_string(),
                            failed: vec![failed.clone()],
                        }
                    };
                    let run = Arc::clone(self);
                    let skipped = step.clone();
                    step.completion()
                        .get_or_init(|| async move { run.finish(&skipped, Err(failure)) })
                        .await;
                }
            }
        }

        match failed_step {
            None => Ok(()),
            Some(failed) => Err(TaskFailure::DependencyFailure {
                task: node.name().to_string(),
                failed: vec![failed],
            }),
        }
    }

    fn schedule_continuation(self: &Arc<Self>, continuation: TaskHandle) {
        if continuation.significance().should_log() {
            debug!(task = %continuation.name(), "Scheduling continuation");
        }
        let handle = tokio::spawn(Arc::clone(self).run_root(continuation));
        self.continuations.lock().push(handle);
    }

    /// Records the terminal outcome of `node`. Returns true on success.
    fn finish(&self, node: &TaskHandle, outcome: Result<(), TaskFailure>) -> bool {
        if !node.mark_terminal(&outcome) {
            return node.succeeded();
        }

        let info = node.info();
        let loud = info.significance.should_log();

        match outcome {
            Ok(()) => {
                self.succeeded.fetch_add(1, Ordering::AcqRel);
                self.executor.metrics.task_succeeded();
                if loud {
                    debug!(task = %info.name, "Task succeeded");
                }
                self.executor.listener.on_succeeded(&info);
                true
            }
            Err(failure) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                if failure.is_cancelled() {
                    self.executor.metrics.task_cancelled();
                } else {
                    self.executor.metrics.task_failed();
                }

                if failure.is_cancelled() || failure.is_dependency_failure() || !loud {
                    debug!(task = %info.name, reason = %failure, "Task did not succeed");
                } else {
                    warn!(task = %info.name, error = %failure, "Task failed");
                }

                self.failures.lock().push(failure.clone());
                self.executor.listener.on_failed(&info, &failure);
                false
            }
        }
    }
}

fn dependency_outcome(
    node: &TaskHandle,
    dependencies: &[TaskHandle],
    dependencies_succeeded: bool,
) -> Result<(), TaskFailure> {
    if dependencies_succeeded {
        return Ok(());
    }
    Err(TaskFailure::DependencyFailure {
        task: node.name().to_string(),
        failed: dependencies
            .iter()
            .filter(|dependency| !dependency.succeeded())
            .map(|dependency| dependency.name().to_string())
            .collect(),
    })
}
