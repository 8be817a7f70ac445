//! Bounded concurrency for network-heavy work.
//!
//! - [`ConcurrencyGuard`] / [`Token`]: permit pool and its releasable handle
//! - [`DownloadConcurrencyController`]: process-wide registry that resizes
//!   every live guard when the configured concurrency changes
//!
//! # Example
//!
//! ```ignore
//! use installgraph::concurrency::DownloadConcurrencyController;
//!
//! let guard = DownloadConcurrencyController::global().acquire_new_guard("libraries");
//! let token = guard.acquire().await?;
//! // ... network transfer ...
//! token.release();
//!
//! // Settings changed: every live guard follows.
//! DownloadConcurrencyController::global().set(16);
//! ```

mod controller;
mod guard;

pub use controller::{
    default_concurrency, DownloadConcurrencyController, CONCURRENCY_PER_CPU,
    MAX_DEFAULT_CONCURRENCY,
};
pub use guard::{ConcurrencyError, ConcurrencyGuard, Token, MAX_CONCURRENCY};
