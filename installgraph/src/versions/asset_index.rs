//! Asset index scan.
//!
//! The asset index lists every resource object of a game version by path,
//! SHA-1 and size. [`AssetIndexTask`] reads the index (downloading it first
//! if it is missing), checks each object on disk, and hands one download
//! task per missing or corrupt object back to the executor as
//! continuations.
//!
//! Layout under the assets directory:
//!
//! ```text
//! indexes/<id>.json
//! objects/<first two hex chars>/<sha1>
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::download::{Checksum, Downloader, FileDownloadTask};
use crate::executor::{
    BoxFuture, Significance, Task, TaskContext, TaskError, TaskHandle,
};

/// Task name shown when the scan fails.
pub const ASSET_INDEX_TASK_NAME: &str = "Gather asset index";

/// Official object host; mirrors are applied by the downloader.
pub const ASSET_OBJECTS_URL: &str = "https://resources.download.minecraft.net";

/// Index files report progress every this many objects.
const PROGRESS_INTERVAL: usize = 64;

#[derive(Debug, Deserialize)]
struct AssetIndex {
    #[serde(default)]
    objects: BTreeMap<String, AssetObject>,
}

#[derive(Clone, Debug, Deserialize)]
struct AssetObject {
    hash: String,
    size: u64,
}

impl AssetObject {
    fn relative_path(&self) -> PathBuf {
        let prefix = self.hash.get(..2).unwrap_or(&self.hash);
        Path::new("objects").join(prefix).join(&self.hash)
    }

    fn url(&self, objects_url: &str) -> String {
        let prefix = self.hash.get(..2).unwrap_or(&self.hash);
        format!("{}/{}/{}", objects_url, prefix, self.hash)
    }
}

/// Reference to an asset index, as found in a version manifest.
#[derive(Clone, Debug)]
pub struct AssetIndexRef {
    pub id: String,
    pub url: String,
    pub sha1: Option<String>,
}

/// Verifies assets and schedules downloads for the broken ones.
pub struct AssetIndexTask {
    downloader: Downloader,
    index: AssetIndexRef,
    assets_dir: PathBuf,
    objects_url: String,
    scheduled: Mutex<Vec<TaskHandle>>,
}

impl AssetIndexTask {
    /// Creates a task checking the objects of `index` under `assets_dir`.
    ///
    /// The index itself is stored at `assets_dir/indexes/<id>.json`.
    pub fn new(downloader: Downloader, index: AssetIndexRef, assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            index,
            assets_dir: assets_dir.into(),
            objects_url: ASSET_OBJECTS_URL.to_string(),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    /// Fetches objects from another host.
    pub fn with_objects_url(mut self, url: impl Into<String>) -> Self {
        self.objects_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns where the index file lives.
    pub fn index_path(&self) -> PathBuf {
        self.assets_dir
            .join("indexes")
            .join(format!("{}.json", self.index.id))
    }

    fn index_download(&self) -> TaskHandle {
        let mut task = FileDownloadTask::new(
            format!("Download asset index {}", self.index.id),
            self.downloader.clone(),
            vec![self.index.url.clone()],
            self.index_path(),
        );
        if let Some(sha1) = &self.index.sha1 {
            task = task.with_checksum(Checksum::sha1(sha1));
        }
        TaskHandle::new(task)
    }

    fn object_download(&self, object: &AssetObject) -> TaskHandle {
        TaskHandle::new(
            FileDownloadTask::new(
                format!("Download asset {}", object.hash),
                self.downloader.clone(),
                vec![object.url(&self.objects_url)],
                self.assets_dir.join(object.relative_path()),
            )
            .with_checksum(Checksum::sha1(&object.hash))
            .with_size(object.size)
            .with_significance(Significance::Minor),
        )
    }
}

/// Returns the objects whose file is missing, the wrong size, or corrupt.
///
/// Runs on a blocking thread; stops early once `ctx` is cancelled.
fn scan_objects(assets_dir: &Path, objects: Vec<AssetObject>, ctx: &TaskContext) -> Vec<AssetObject> {
    let total = objects.len() as u64;
    let mut missing = Vec::new();

    for (i, object) in objects.into_iter().enumerate() {
        if ctx.is_cancelled() {
            break;
        }
        if i % PROGRESS_INTERVAL == 0 {
            ctx.report_progress(i as u64, total);
        }

        let path = assets_dir.join(object.relative_path());
        let intact = match std::fs::metadata(&path) {
            Ok(meta) if meta.len() == object.size => Checksum::sha1(&object.hash).matches_file(&path),
            _ => false,
        };
        if !intact {
            missing.push(object);
        }
    }

    ctx.report_progress(total, total);
    missing
}

impl Task for AssetIndexTask {
    fn name(&self) -> &str {
        ASSET_INDEX_TASK_NAME
    }

    /// Depends on the index download only when the index file is absent.
    fn dependencies(&self) -> Vec<TaskHandle> {
        if self.index_path().is_file() {
            Vec::new()
        } else {
            vec![self.index_download()]
        }
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            if !ctx.dependencies_succeeded() {
                return Err(TaskError::new("asset index was not downloaded"));
            }

            let path = self.index_path();
            let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                TaskError::new(format!("failed to read {}", path.display())).with_source(e)
            })?;
            if text.trim().is_empty() {
                return Err(TaskError::new("index file was empty"));
            }

            let index: AssetIndex = serde_json::from_str(&text)
                .map_err(|e| TaskError::new("index file is malformed").with_source(e))?;

            // Several paths can share one object.
            let mut seen = HashSet::new();
            let objects: Vec<AssetObject> = index
                .objects
                .into_values()
                .filter(|object| seen.insert(object.hash.clone()))
                .collect();
            let total = objects.len();

            let assets_dir = self.assets_dir.clone();
            let scan_ctx = ctx.clone();
            let missing = tokio::task::spawn_blocking(move || scan_objects(&assets_dir, objects, &scan_ctx))
                .await
                .map_err(|e| TaskError::new("asset scan stopped unexpectedly").with_source(e))?;

            if ctx.is_cancelled() {
                return Err(TaskError::cancelled());
            }

            info!(
                index = %self.index.id,
                objects = total,
                missing = missing.len(),
                "Scanned assets"
            );

            let downloads: Vec<TaskHandle> = missing.iter().map(|object| self.object_download(object)).collect();
            debug!(count = downloads.len(), "Scheduling asset downloads");
            *self.scheduled.lock() = downloads;
            Ok(())
        })
    }

    fn continuations(&self) -> Vec<TaskHandle> {
        std::mem::take(&mut *self.scheduled.lock())
    }
}
