//! File download task.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::executor::{
    BoxFuture, ResultSlot, RetryPolicy, Significance, Task, TaskContext, TaskError, TaskHandle,
};

use super::checksum::Checksum;
use super::error::DownloadError;
use super::fetch::Downloader;

/// Where the task gets its URL from.
enum UrlSource {
    /// Known up front; each URL is expanded into mirror candidates.
    Fixed(Vec<String>),
    /// Published by a previous task.
    Slot(ResultSlot<String>),
}

/// Downloads one file to disk.
///
/// The body is written to `<destination>.part` and renamed into place once
/// it has been verified, so a crash never leaves a truncated file under the
/// final name. If the destination already exists and matches the expected
/// checksum, nothing is fetched.
///
/// On success the destination path is published into
/// [`result_slot`](Self::result_slot).
pub struct FileDownloadTask {
    name: String,
    downloader: Downloader,
    source: UrlSource,
    destination: PathBuf,
    checksum: Option<Checksum>,
    size: Option<u64>,
    dependencies: Vec<TaskHandle>,
    significance: Significance,
    result: ResultSlot<PathBuf>,
}

impl FileDownloadTask {
    /// Creates a task downloading the first working URL of `urls`.
    pub fn new(
        name: impl Into<String>,
        downloader: Downloader,
        urls: Vec<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self::with_source(name, downloader, UrlSource::Fixed(urls), destination)
    }

    /// Creates a task whose URL is published by `producer`.
    ///
    /// `producer` becomes a dependency.
    pub fn with_url_from(
        name: impl Into<String>,
        downloader: Downloader,
        producer: TaskHandle,
        url: ResultSlot<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self::with_source(name, downloader, UrlSource::Slot(url), destination).with_dependency(producer)
    }

    fn with_source(
        name: impl Into<String>,
        downloader: Downloader,
        source: UrlSource,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            downloader,
            source,
            destination: destination.into(),
            checksum: None,
            size: None,
            dependencies: Vec::new(),
            significance: Significance::Major,
            result: ResultSlot::new(),
        }
    }

    /// Verifies the body against `checksum`.
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Verifies the body length.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Overrides the downloader's retry policy for this file.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.downloader = self.downloader.with_retry(retry);
        self
    }

    /// Adds a dependency.
    pub fn with_dependency(mut self, dependency: TaskHandle) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Sets how prominently listeners report this download.
    ///
    /// Defaults to `Major`; bulk downloads use `Minor`.
    pub fn with_significance(mut self, significance: Significance) -> Self {
        self.significance = significance;
        self
    }

    /// Returns the destination path.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Returns the slot the final path is published into.
    pub fn result_slot(&self) -> ResultSlot<PathBuf> {
        self.result.clone()
    }

    fn candidates(&self) -> Result<Vec<String>, TaskError> {
        match &self.source {
            UrlSource::Fixed(urls) => Ok(self.downloader.candidates(urls)),
            UrlSource::Slot(slot) => {
                let url = slot.cloned().ok_or_else(|| TaskError::missing_input("download url"))?;
                Ok(self.downloader.candidates(&[url]))
            }
        }
    }

    fn validate(&self, url: &str, body: &[u8]) -> Result<(), DownloadError> {
        if let Some(expected) = self.size {
            if body.len() as u64 != expected {
                return Err(DownloadError::SizeMismatch {
                    url: url.to_string(),
                    expected,
                    actual: body.len() as u64,
                });
            }
        }
        if let Some(checksum) = &self.checksum {
            checksum.verify(body, &self.destination.display().to_string())?;
        }
        Ok(())
    }

    /// Returns true if the destination already holds the expected file.
    async fn already_present(&self) -> bool {
        let Some(checksum) = self.checksum.clone() else {
            return false;
        };
        let path = self.destination.clone();
        tokio::task::spawn_blocking(move || checksum.matches_file(&path))
            .await
            .unwrap_or(false)
    }

    async fn store(&self, body: &[u8]) -> Result<(), DownloadError> {
        if let Some(parent) = self.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let part = part_path(&self.destination);
        tokio::fs::write(&part, body)
            .await
            .map_err(|e| DownloadError::io(&part, e))?;

        if let Err(e) = tokio::fs::rename(&part, &self.destination).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(DownloadError::io(&self.destination, e));
        }
        Ok(())
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let mut part = OsString::from(destination.as_os_str());
    part.push(".part");
    PathBuf::from(part)
}

impl Task for FileDownloadTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskHandle> {
        self.dependencies.clone()
    }

    fn significance(&self) -> Significance {
        self.significance
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            if !ctx.dependencies_succeeded() {
                return Err(TaskError::new("a dependency failed"));
            }

            if self.already_present().await {
                debug!(task = %self.name, path = %self.destination.display(), "Already present, skipping");
                let _ = self.result.publish(self.destination.clone());
                return Ok(());
            }

            let candidates = self.candidates()?;
            let (url, body) = self
                .downloader
                .fetch(ctx, &candidates, |url, body| self.validate(url, body))
                .await?;

            self.store(&body).await?;
            debug!(
                task = %self.name,
                url = %url,
                path = %self.destination.display(),
                bytes = body.len(),
                "Stored"
            );

            let _ = self.result.publish(self.destination.clone());
            Ok(())
        })
    }
}
