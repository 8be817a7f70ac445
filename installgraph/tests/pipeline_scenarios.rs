//! End-to-end pipeline scenarios.
//!
//! These tests drive the public API only:
//! - failure aggregation across dependencies
//! - `after` chains that stop at the failing step
//! - guard-bounded parallel downloads
//! - random dependency graphs (termination and ordering)
//!
//! Run with: `cargo test --test pipeline_scenarios`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use rand::Rng;
use tempfile::TempDir;

use installgraph::concurrency::ConcurrencyGuard;
use installgraph::download::{DownloadError, Downloader, FileDownloadTask, HttpClient};
use installgraph::executor::{
    BoxFuture, FnTask, PipelineStatus, RetryPolicy, TaskError, TaskGraphExecutor, TaskHandle,
};

// ============================================================================
// Helpers
// ============================================================================

/// Serves fixed bodies; unknown URLs answer 404.
struct StaticClient {
    bodies: HashMap<String, Vec<u8>>,
    max_delay_ms: u64,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StaticClient {
    fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            max_delay_ms: 0,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn with_body(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    /// Each request sleeps a random time up to `max_delay_ms`.
    fn with_random_delay(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl HttpClient for StaticClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, DownloadError>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.max_delay_ms > 0 {
                let delay = rand::rng().random_range(1..=self.max_delay_ms);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| DownloadError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        })
    }
}

fn downloader(client: Arc<StaticClient>, permits: usize) -> Downloader {
    Downloader::with_guard(client, ConcurrencyGuard::new(permits, "scenario"))
        .with_retry(RetryPolicy::None)
}

// ============================================================================
// Failure aggregation
// ============================================================================

#[tokio::test]
async fn test_root_cause_is_failing_dependency() {
    let index = TaskHandle::from_fn("fetch-index", |_ctx| async { Ok(()) });
    let jar = TaskHandle::from_fn("fetch-jar", |_ctx| async {
        Err(TaskError::new("disk full").with_source(std::io::Error::new(
            std::io::ErrorKind::Other,
            "no space left on device",
        )))
    });

    let seen_flag = Arc::new(Mutex::new(None));
    let record = seen_flag.clone();
    let install = TaskHandle::new(
        FnTask::new("install", move |ctx| {
            let record = record.clone();
            async move {
                *record.lock() = Some(ctx.dependencies_succeeded());
                if ctx.dependencies_succeeded() {
                    Ok(())
                } else {
                    Err(TaskError::new("a dependency failed"))
                }
            }
        })
        .with_dependencies(vec![index.clone(), jar.clone()]),
    );

    let report = TaskGraphExecutor::default().run(install.clone()).await;

    assert_eq!(report.status, PipelineStatus::Failed);
    assert_eq!(*seen_flag.lock(), Some(false));
    assert!(index.succeeded());
    assert_eq!(report.root_cause().map(|f| f.task()), Some("fetch-jar"));

    let err = report.into_result().unwrap_err();
    assert_eq!(err.stage, "fetch-jar");
    assert!(err.to_string().contains("disk full"));
}

// ============================================================================
// Sequences
// ============================================================================

#[tokio::test]
async fn test_chain_stops_at_failing_step_and_keeps_earlier_files() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(
        StaticClient::new()
            .with_body("https://example.com/a.jar", b"library a")
            .with_body("https://example.com/b.jar", b"library b"),
    );
    let dl = downloader(client, 4);

    let step = |name: &str, file: &str| {
        TaskHandle::new(FileDownloadTask::new(
            name,
            dl.clone(),
            vec![format!("https://example.com/{}", file)],
            dir.path().join(file),
        ))
    };
    let a = step("fetch-a", "a.jar");
    let b = step("fetch-b", "b.jar");
    let c = step("fetch-c", "c.jar");

    let chain = a.clone().after(b.clone()).after(c.clone());
    assert_eq!(chain.name(), "fetch-a -> fetch-b -> fetch-c");

    let report = TaskGraphExecutor::default().run(chain).await;

    assert_eq!(report.status, PipelineStatus::Failed);
    assert_eq!(report.root_cause().map(|f| f.task()), Some("fetch-c"));
    assert!(a.succeeded() && b.succeeded());
    assert_eq!(std::fs::read(dir.path().join("a.jar")).unwrap(), b"library a");
    assert_eq!(std::fs::read(dir.path().join("b.jar")).unwrap(), b"library b");
    assert!(!dir.path().join("c.jar").exists());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_guard_bounds_parallel_downloads() {
    let dir = TempDir::new().unwrap();
    let mut client = StaticClient::new().with_random_delay(25);
    for i in 0..10 {
        client = client.with_body(&format!("https://example.com/lib{}.jar", i), b"jar");
    }
    let client = Arc::new(client);
    let dl = downloader(client.clone(), 3);

    let files = (0..10)
        .map(|i| {
            TaskHandle::new(FileDownloadTask::new(
                format!("fetch-lib{}", i),
                dl.clone(),
                vec![format!("https://example.com/lib{}.jar", i)],
                dir.path().join(format!("lib{}.jar", i)),
            ))
        })
        .collect();

    let report = TaskGraphExecutor::default()
        .run(TaskHandle::group("libraries", files))
        .await;

    assert!(report.is_success(), "{:?}", report.failures);
    assert!(client.peak_in_flight() <= 3, "peak {}", client.peak_in_flight());
    assert!(dl.guard().peak_in_flight() <= 3);
    assert_eq!(dl.guard().in_flight(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 10);
}

// ============================================================================
// Random graphs
// ============================================================================

/// Node `i` may depend on any node `j < i`, so every generated graph is acyclic.
fn dag_strategy() -> impl Strategy<Value = Vec<(Vec<usize>, bool)>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                let deps = if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec(0..i, 0..=i.min(3)).boxed()
                };
                (deps, prop::bool::weighted(0.15))
            })
            .collect::<Vec<_>>()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_random_dag_terminates_in_dependency_order(spec in dag_strategy()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let order: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let mut nodes: Vec<TaskHandle> = Vec::new();
        for (i, (deps, fails)) in spec.iter().enumerate() {
            let order = order.clone();
            let fails = *fails;
            let task = FnTask::new(format!("node-{}", i), move |_ctx| {
                let order = order.clone();
                async move {
                    order.lock().push(i);
                    if fails {
                        Err(TaskError::new("boom"))
                    } else {
                        Ok(())
                    }
                }
            })
            .with_dependencies(deps.iter().map(|&d| nodes[d].clone()).collect());
            nodes.push(TaskHandle::new(task));
        }

        let report = runtime.block_on(
            TaskGraphExecutor::default().run(TaskHandle::group("all", nodes.clone())),
        );

        let order = order.lock().clone();
        prop_assert_eq!(order.len(), nodes.len());
        prop_assert!(nodes.iter().all(|node| node.is_terminal()));

        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &node)| (node, pos)).collect();
        for (i, (deps, _)) in spec.iter().enumerate() {
            for d in deps {
                prop_assert!(position[d] < position[&i], "node-{} ran before its dependency node-{}", i, d);
            }
        }

        let any_failed = spec.iter().any(|(_, fails)| *fails);
        prop_assert_eq!(report.is_success(), !any_failed);
    }
}
