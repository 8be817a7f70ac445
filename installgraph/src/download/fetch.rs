//! Shared fetch loop and the text fetch task.
//!
//! Every download goes through [`Downloader::fetch`]:
//!
//! ```text
//! for each candidate URL:
//!     for each attempt allowed by the retry policy:
//!         acquire guard token        (cancellable)
//!         GET with progress          (cancellable)
//!         release token
//!         validate body              (size, checksum)
//!         transient error -> back off and retry
//!         permanent error -> next candidate
//! ```
//!
//! The token is held only around the network transfer, never while backing
//! off or writing to disk.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::concurrency::{ConcurrencyGuard, DownloadConcurrencyController};
use crate::executor::{BoxFuture, ResultSlot, RetryPolicy, Task, TaskContext, TaskError, TaskHandle};

use super::error::DownloadError;
use super::http::HttpClient;
use super::mirror::MirrorList;

/// Everything a download task needs to reach the network.
///
/// Cheap to clone; tasks created from the same downloader share one guard.
#[derive(Clone)]
pub struct Downloader {
    client: Arc<dyn HttpClient>,
    guard: ConcurrencyGuard,
    retry: RetryPolicy,
    mirrors: MirrorList,
}

impl Downloader {
    /// Creates a downloader with a fresh guard from the global controller.
    pub fn new(client: Arc<dyn HttpClient>, label: impl Into<String>) -> Self {
        Self::with_guard(
            client,
            DownloadConcurrencyController::global().acquire_new_guard(label),
        )
    }

    /// Creates a downloader limited by an existing guard.
    pub fn with_guard(client: Arc<dyn HttpClient>, guard: ConcurrencyGuard) -> Self {
        Self {
            client,
            guard,
            retry: RetryPolicy::default(),
            mirrors: MirrorList::default(),
        }
    }

    /// Sets the retry policy applied per candidate URL.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the mirror rules used to expand URLs.
    pub fn with_mirrors(mut self, mirrors: MirrorList) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Returns the guard limiting this downloader.
    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// Returns the retry policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the mirror rules.
    pub fn mirrors(&self) -> &MirrorList {
        &self.mirrors
    }

    /// Expands URLs into mirror candidates, keeping first occurrences.
    pub fn candidates<S: AsRef<str>>(&self, urls: &[S]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for url in urls {
            for candidate in self.mirrors.candidates(url.as_ref()) {
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// Creates a task that fetches `url` as text.
    pub fn text(&self, name: impl Into<String>, url: impl Into<String>) -> FetchTextTask {
        FetchTextTask::new(name, self.clone(), vec![url.into()])
    }

    /// Fetches the first candidate that yields a body passing `validate`.
    ///
    /// Returns the URL that served the body along with it.
    pub async fn fetch<V>(
        &self,
        ctx: &TaskContext,
        candidates: &[String],
        validate: V,
    ) -> Result<(String, Vec<u8>), DownloadError>
    where
        V: Fn(&str, &[u8]) -> Result<(), DownloadError>,
    {
        let mut last_error = None;

        for url in candidates {
            let mut attempt = 1;
            loop {
                if ctx.is_cancelled() {
                    return Err(DownloadError::Cancelled);
                }

                let result = self
                    .transfer(ctx, url)
                    .await
                    .and_then(|body| validate(url, &body).map(|()| body));

                let err = match result {
                    Ok(body) => {
                        debug!(task = ctx.name(), url = %url, bytes = body.len(), "Fetched");
                        return Ok((url.clone(), body));
                    }
                    Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                    Err(err) => err,
                };

                let delay = if err.is_transient() {
                    self.retry.delay_for_attempt(attempt)
                } else {
                    None
                };

                match delay {
                    Some(delay) => {
                        warn!(
                            task = ctx.name(),
                            url = %url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Download failed, retrying"
                        );
                        tokio::select! {
                            biased;
                            _ = ctx.cancelled() => return Err(DownloadError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                    None => {
                        warn!(task = ctx.name(), url = %url, error = %err, "Giving up on candidate");
                        last_error = Some(err);
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DownloadError::NoCandidates(ctx.name().to_string())))
    }

    /// One GET under a guard token.
    async fn transfer(&self, ctx: &TaskContext, url: &str) -> Result<Vec<u8>, DownloadError> {
        let token = self.guard.acquire_cancellable(ctx.cancellation()).await?;
        let progress = |current: u64, total: Option<u64>| {
            ctx.report_progress(current, total.unwrap_or(0));
        };

        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(DownloadError::Cancelled),
            body = self.client.get_with_progress(url, &progress) => body,
        };
        token.release();
        result
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("guard", &self.guard)
            .field("retry", &self.retry)
            .field("source", &self.mirrors.source())
            .finish()
    }
}

// =============================================================================
// FetchTextTask
// =============================================================================

/// Fetches a small text document (a version manifest, say) and publishes it.
pub struct FetchTextTask {
    name: String,
    downloader: Downloader,
    urls: Vec<String>,
    dependencies: Vec<TaskHandle>,
    result: ResultSlot<String>,
}

impl FetchTextTask {
    /// Creates a task fetching the first working URL of `urls`.
    pub fn new(name: impl Into<String>, downloader: Downloader, urls: Vec<String>) -> Self {
        Self {
            name: name.into(),
            downloader,
            urls,
            dependencies: Vec::new(),
            result: ResultSlot::new(),
        }
    }

    /// Adds a dependency.
    pub fn with_dependency(mut self, dependency: TaskHandle) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Returns the slot the body is published into.
    pub fn result_slot(&self) -> ResultSlot<String> {
        self.result.clone()
    }
}

impl Task for FetchTextTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskHandle> {
        self.dependencies.clone()
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            if !ctx.dependencies_succeeded() {
                return Err(TaskError::new("a dependency failed"));
            }

            let candidates = self.downloader.candidates(&self.urls);
            let (_, body) = self
                .downloader
                .fetch(ctx, &candidates, |url, body| {
                    std::str::from_utf8(body)
                        .map(|_| ())
                        .map_err(|_| DownloadError::InvalidText { url: url.to_string() })
                })
                .await?;

            // Validated above.
            let text = String::from_utf8_lossy(&body).into_owned();
            let _ = self.result.publish(text);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::http::tests::{MockHttpClient, MockResponse};
    use crate::download::DownloadSource;
    use crate::executor::{TaskGraphExecutor, TaskState};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn downloader(client: MockHttpClient) -> (Downloader, Arc<MockHttpClient>) {
        let client = Arc::new(client);
        let downloader = Downloader::with_guard(client.clone(), ConcurrencyGuard::new(2, "test"))
            .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)))
            .with_mirrors(MirrorList::without_rules(DownloadSource::Official));
        (downloader, client)
    }

    fn accept(_url: &str, _body: &[u8]) -> Result<(), DownloadError> {
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let (downloader, client) = downloader(MockHttpClient::new().with_sequence(
            "http://a",
            vec![
                MockResponse::Status(503),
                MockResponse::Timeout,
                MockResponse::Body(b"ok".to_vec()),
            ],
        ));
        let ctx = TaskContext::detached("fetch", true);

        let (url, body) = downloader.fetch(&ctx, &["http://a".to_string()], accept).await.unwrap();
        assert_eq!(url, "http://a");
        assert_eq!(body, b"ok");
        assert_eq!(client.request_count("http://a"), 3);
        assert_eq!(downloader.guard().available_permits(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_moves_to_next_candidate() {
        let (downloader, client) = downloader(
            MockHttpClient::new()
                .with_status("http://official", 404)
                .with_body("http://mirror", b"ok".to_vec()),
        );
        let ctx = TaskContext::detached("fetch", true);
        let candidates = vec!["http://official".to_string(), "http://mirror".to_string()];

        let (url, _) = downloader.fetch(&ctx, &candidates, accept).await.unwrap();
        assert_eq!(url, "http://mirror");
        assert_eq!(client.request_count("http://official"), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_error() {
        let (downloader, client) = downloader(MockHttpClient::new().with_status("http://a", 500));
        let ctx = TaskContext::detached("fetch", true);

        let err = downloader.fetch(&ctx, &["http://a".to_string()], accept).await.unwrap_err();
        assert!(matches!(err, DownloadError::Status { status: 500, .. }));
        assert_eq!(client.request_count("http://a"), 3);
    }

    #[tokio::test]
    async fn test_validation_failure_is_retried() {
        let (downloader, client) = downloader(MockHttpClient::new().with_body("http://a", b"bad".to_vec()));
        let ctx = TaskContext::detached("fetch", true);

        let err = downloader
            .fetch(&ctx, &["http://a".to_string()], |url, body| {
                Err(DownloadError::SizeMismatch {
                    url: url.to_string(),
                    expected: 10,
                    actual: body.len() as u64,
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::SizeMismatch { .. }));
        assert_eq!(client.request_count("http://a"), 3);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let (downloader, _) = downloader(MockHttpClient::new());
        let ctx = TaskContext::detached("fetch", true);
        let err = downloader.fetch(&ctx, &[], accept).await.unwrap_err();
        assert!(matches!(err, DownloadError::NoCandidates(_)));
    }

    #[tokio::test]
    async fn test_cancellation_releases_token() {
        let (downloader, _) = downloader(
            MockHttpClient::new()
                .with_body("http://slow", b"x".to_vec())
                .with_delay(Duration::from_secs(30)),
        );
        let token = CancellationToken::new();
        let ctx = TaskContext::detached("fetch", true).with_cancellation(token.clone());

        let fetch = {
            let downloader = downloader.clone();
            tokio::spawn(async move { downloader.fetch(&ctx, &["http://slow".to_string()], accept).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(downloader.guard().in_flight(), 1);

        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), fetch).await.unwrap().unwrap();
        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert_eq!(downloader.guard().in_flight(), 0);
        assert_eq!(downloader.guard().available_permits(), 2);
    }

    #[test]
    fn test_candidates_are_deduplicated() {
        let (downloader, _) = downloader(MockHttpClient::new());
        let downloader = downloader.with_mirrors(MirrorList::new(DownloadSource::Mirror));
        let urls = [
            "https://libraries.minecraft.net/a.jar",
            "https://libraries.minecraft.net/a.jar",
        ];
        let candidates = downloader.candidates(&urls);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].starts_with("https://bmclapi2.bangbang93.com/libraries"));
    }

    #[tokio::test]
    async fn test_fetch_text_task_publishes_body() {
        let (downloader, _) = downloader(MockHttpClient::new().with_body("http://manifest", "{\"a\":1}"));
        let task = downloader.text("fetch-manifest", "http://manifest");
        let slot = task.result_slot();
        let handle = TaskHandle::new(task);

        let report = TaskGraphExecutor::default().run(handle.clone()).await;
        assert!(report.is_success());
        assert_eq!(handle.state(), TaskState::Succeeded);
        assert_eq!(slot.get().map(String::as_str), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn test_fetch_text_task_rejects_binary() {
        let (downloader, _) = downloader(MockHttpClient::new().with_body("http://bin", vec![0xff, 0xfe]));
        let task = downloader.text("fetch-bin", "http://bin");
        let slot = task.result_slot();

        let report = TaskGraphExecutor::default().run(TaskHandle::new(task)).await;
        assert!(!report.is_success());
        assert!(report.root_cause().unwrap().to_string().contains("not valid UTF-8"));
        assert!(!slot.is_published());
    }
}
