//! Download tasks.
//!
//! Network access goes through the [`HttpClient`] seam. A [`Downloader`]
//! bundles a client with a [`ConcurrencyGuard`](crate::concurrency::ConcurrencyGuard),
//! a retry policy and mirror rules; download tasks are built from it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use installgraph::download::{Checksum, Downloader, FileDownloadTask, ReqwestClient};
//! use installgraph::executor::{TaskGraphExecutor, TaskHandle};
//!
//! let downloader = Downloader::new(Arc::new(ReqwestClient::new()?), "libraries");
//! let jar = FileDownloadTask::new("fetch-jar", downloader, vec![url], "client.jar")
//!     .with_checksum(Checksum::sha1(sha1));
//!
//! let report = TaskGraphExecutor::default().run(TaskHandle::new(jar)).await;
//! ```

mod checksum;
mod error;
mod fetch;
mod file;
pub(crate) mod http;
mod mirror;

pub use checksum::Checksum;
pub use error::DownloadError;
pub use fetch::{Downloader, FetchTextTask};
pub use file::FileDownloadTask;
pub use http::{HttpClient, ProgressFn, ReqwestClient, DEFAULT_TIMEOUT_SECS, USER_AGENT};
pub use mirror::{DownloadSource, MirrorList, BMCLAPI_ROOT};
