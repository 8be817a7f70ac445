//! HTTP client abstraction for testability

use std::time::Duration;

use crate::executor::BoxFuture;

use super::error::DownloadError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("installgraph/", env!("CARGO_PKG_VERSION"));

/// Largest body size preallocated from a `Content-Length` header (16MB).
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Progress callback: `(bytes_received, total_if_known)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Trait for HTTP client operations.
///
/// Lets download tasks run against a mock client in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the body.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, DownloadError>>;

    /// Performs an HTTP GET request, reporting progress as the body arrives.
    ///
    /// The default implementation reports once, after the whole body is in.
    fn get_with_progress<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<Vec<u8>, DownloadError>> {
        Box::pin(async move {
            let body = self.get(url).await?;
            let len = body.len() as u64;
            progress(len, Some(len));
            Ok(body)
        })
    }
}

/// Real HTTP client implementation using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &str, progress: Option<ProgressFn<'_>>) -> Result<Vec<u8>, DownloadError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOC) as usize);

        while let Some(chunk) = response.chunk().await.map_err(|e| map_reqwest_error(url, e))? {
            body.extend_from_slice(&chunk);
            if let Some(progress) = progress {
                progress(body.len() as u64, total);
            }
        }

        if let Some(expected) = total {
            if body.len() as u64 != expected {
                return Err(DownloadError::SizeMismatch {
                    url: url.to_string(),
                    expected,
                    actual: body.len() as u64,
                });
            }
        }

        Ok(body)
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> DownloadError {
    if err.is_timeout() {
        DownloadError::Timeout {
            url: url.to_string(),
        }
    } else {
        DownloadError::Request {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

impl HttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, DownloadError>> {
        Box::pin(self.fetch(url, None))
    }

    fn get_with_progress<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<Vec<u8>, DownloadError>> {
        Box::pin(self.fetch(url, Some(progress)))
    }
}
