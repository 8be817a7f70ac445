//! InstallGraph - dependency-aware download and install pipelines
//!
//! Game installs are graphs of small jobs: fetch a manifest, then the
//! client jar, the libraries and the asset index, then every missing asset.
//! This crate runs such graphs.
//!
//! - [`executor`]: tasks, dependency resolution, failure aggregation
//! - [`concurrency`]: resizable permit pools for network transfers
//! - [`download`]: HTTP client seam, mirrors, checksums, file downloads
//! - [`versions`]: installer version lists and the asset index scan
//! - [`config`], [`logging`], [`telemetry`]: ambient support
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use installgraph::download::{Downloader, FileDownloadTask, ReqwestClient};
//! use installgraph::executor::{TaskGraphExecutor, TaskHandle};
//!
//! let downloader = Downloader::new(Arc::new(ReqwestClient::new()?), "install");
//! let index = TaskHandle::new(downloader.text("fetch-index", index_url));
//! let jar = TaskHandle::new(FileDownloadTask::new("fetch-jar", downloader, vec![jar_url], "client.jar"));
//!
//! let report = TaskGraphExecutor::default()
//!     .run(TaskHandle::group("install", vec![index, jar]))
//!     .await;
//! report.into_result()?;
//! ```

pub mod concurrency;
pub mod config;
pub mod download;
pub mod executor;
pub mod logging;
pub mod telemetry;
pub mod versions;

pub use config::ConfigFile;
pub use executor::{PipelineError, PipelineReport, TaskGraphExecutor, TaskHandle};
