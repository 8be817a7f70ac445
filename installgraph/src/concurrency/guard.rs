//! Semaphore-backed concurrency guard and its permit token.
//!
//! A [`ConcurrencyGuard`] bounds how many expensive operations (typically
//! network transfers) run at once. Callers acquire a [`Token`] immediately
//! before the bounded operation and release it on every exit path. Dropping
//! the token releases it, so `?` and cancellation are covered.
//!
//! ```text
//! acquire() ──► Token ──► network I/O ──► release() / drop
//!    │                                         │
//!    └──── waits while P tokens are out ◄──────┘
//! ```
//!
//! The total permit count P can change at runtime through
//! [`DownloadConcurrencyController`](super::DownloadConcurrencyController).
//! Shrinking never revokes outstanding tokens; surplus permits are drained
//! as holders release them.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// Errors raised while acquiring a permit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcurrencyError {
    /// The guard was closed while waiting.
    #[error("concurrency guard '{0}' is closed")]
    Closed(String),

    /// The caller's cancellation token fired while waiting.
    #[error("cancelled while waiting for a '{0}' permit")]
    Cancelled(String),
}

/// Largest permit count a guard accepts. Larger requests are clamped.
pub const MAX_CONCURRENCY: usize = 1024;

/// Shared state behind a guard.
///
/// Tokens keep this alive, so a guard's semaphore outlives the guard handle
/// for as long as permits are outstanding.
pub(crate) struct GuardInner {
    semaphore: Arc<Semaphore>,
    /// Configured total permit count (target, not currently available).
    permits: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    label: String,
}

impl GuardInner {
    /// Adds `delta` permits to circulation.
    pub(crate) fn grow(&self, delta: usize) {
        self.semaphore.add_permits(delta);
        self.permits.fetch_add(delta, Ordering::AcqRel);
    }

    /// Removes `delta` permits from circulation.
    ///
    /// Idle permits are taken immediately. When holders are still busy the
    /// remainder is drained in the background as tokens come back.
    pub(crate) fn shrink(&self, delta: usize) {
        if delta == 0 {
            return;
        }
        let Ok(count) = u32::try_from(delta) else {
            tracing::warn!(label = %self.label, delta, "Shrink delta too large, ignoring");
            return;
        };
        self.permits.fetch_sub(delta, Ordering::AcqRel);

        match self.semaphore.try_acquire_many(count) {
            Ok(permit) => {
                permit.forget();
                tracing::trace!(label = %self.label, delta, "Shrunk guard immediately");
            }
            Err(TryAcquireError::Closed) => {}
            Err(TryAcquireError::NoPermits) => {
                tracing::debug!(
                    label = %self.label,
                    delta,
                    "Guard busy, draining permits in background"
                );
                drain_in_background(Arc::clone(&self.semaphore), count, self.label.clone());
            }
        }
    }

    pub(crate) fn total_permits(&self) -> usize {
        self.permits.load(Ordering::Acquire)
    }
}

/// Takes `count` permits out of circulation once they become available.
///
/// Runs on the ambient tokio runtime when there is one, otherwise on a
/// short-lived helper thread.
fn drain_in_background(semaphore: Arc<Semaphore>, count: u32, label: String) {
    let drain = async move {
        if let Ok(permit) = semaphore.acquire_many_owned(count).await {
            permit.forget();
            tracing::debug!(label = %label, count, "Background drain complete");
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(drain);
        }
        Err(_) => {
            let spawned = std::thread::Builder::new()
                .name("guard-drain".to_string())
                .spawn(move || futures::executor::block_on(drain));
            if let Err(e) = spawned {
                tracing::warn!(error = %e, "Failed to spawn guard drain thread");
            }
        }
    }
}

/// A resizable bound on concurrent operations.
///
/// Cloning a guard yields another handle to the same permits.
#[derive(Clone)]
pub struct ConcurrencyGuard {
    inner: Arc<GuardInner>,
}

impl ConcurrencyGuard {
    /// Creates a standalone guard with `permits` permits.
    ///
    /// Standalone guards are not resized by any controller. The permit
    /// count is clamped to `1..=MAX_CONCURRENCY`.
    pub fn new(permits: usize, label: impl Into<String>) -> Self {
        let permits = permits.clamp(1, MAX_CONCURRENCY);
        let label = label.into();

        tracing::debug!(permits, label = %label, "Created concurrency guard");

        Self {
            inner: Self::new_inner(permits, label),
        }
    }

    /// Waits for a permit.
    ///
    /// Only the calling task waits; other tasks keep running.
    pub async fn acquire(&self) -> Result<Token, ConcurrencyError> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ConcurrencyError::Closed(self.inner.label.clone()))?;
        Ok(self.issue(permit))
    }

    /// Waits for a permit unless `cancellation` fires first.
    pub async fn acquire_cancellable(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<Token, ConcurrencyError> {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                Err(ConcurrencyError::Cancelled(self.inner.label.clone()))
            }
            token = self.acquire() => token,
        }
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<Token> {
        Arc::clone(&self.inner.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.issue(permit))
    }

    fn issue(&self, permit: OwnedSemaphorePermit) -> Token {
        let now = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        tracing::trace!(label = %self.inner.label, in_flight = now, "Permit acquired");

        Token {
            permit: Mutex::new(Some(permit)),
            released: AtomicBool::new(false),
            guard: Arc::clone(&self.inner),
        }
    }

    /// Closes the guard, failing current and future waiters.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    /// Returns the number of permits free right now.
    pub fn available_permits(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Returns the configured total permit count.
    ///
    /// After a shrink this is the new target even while the drain is pending.
    pub fn total_permits(&self) -> usize {
        self.inner.total_permits()
    }

    /// Returns the number of unreleased tokens.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Returns the highest number of simultaneously unreleased tokens seen.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::Acquire)
    }

    /// Returns the guard's label.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub(crate) fn inner(&self) -> &Arc<GuardInner> {
        &self.inner
    }

    pub(crate) fn from_inner(inner: Arc<GuardInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn new_inner(permits: usize, label: String) -> Arc<GuardInner> {
        Arc::new(GuardInner {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits: AtomicUsize::new(permits),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            label,
        })
    }
}

impl fmt::Debug for ConcurrencyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGuard")
            .field("label", &self.inner.label)
            .field("total_permits", &self.total_permits())
            .field("available", &self.available_permits())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// One acquired permit.
///
/// Release is idempotent and also happens on drop.
pub struct Token {
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    released: AtomicBool,
    guard: Arc<GuardInner>,
}

impl Token {
    /// Returns the permit to its guard. Later calls do nothing.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        drop(self.permit.lock().take());
        let now = self.guard.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::trace!(label = %self.guard.label, in_flight = now, "Permit released");
    }

    /// Returns true once the token has been released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("guard", &self.guard.label)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_up_to_permit_count() {
        let guard = ConcurrencyGuard::new(3, "test");

        let t1 = guard.acquire().await.unwrap();
        let t2 = guard.acquire().await.unwrap();
        let t3 = guard.acquire().await.unwrap();

        assert_eq!(guard.in_flight(), 3);
        assert_eq!(guard.available_permits(), 0);
        assert!(guard.try_acquire().is_none());

        drop((t1, t2, t3));
        assert_eq!(guard.in_flight(), 0);
        assert_eq!(guard.available_permits(), 3);
        assert_eq!(guard.peak_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_extra_acquire_blocks_until_release() {
        let guard = ConcurrencyGuard::new(2, "test");
        let t1 = guard.acquire().await.unwrap();
        let _t2 = guard.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), guard.acquire()).await;
        assert!(blocked.is_err(), "third acquire should wait");

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        t1.release();
        let token = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after release")
            .unwrap()
            .unwrap();
        assert!(!token.is_released());
        assert_eq!(guard.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_double_release_is_idempotent() {
        let guard = ConcurrencyGuard::new(1, "test");
        let token = guard.acquire().await.unwrap();

        token.release();
        token.release();
        drop(token);

        assert_eq!(guard.available_permits(), 1);
        assert_eq!(guard.in_flight(), 0);

        let _a = guard.acquire().await.unwrap();
        assert!(guard.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_acquire_cancellable() {
        let guard = ConcurrencyGuard::new(1, "net");
        let _held = guard.acquire().await.unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let guard = guard.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { guard.acquire_cancellable(&cancel).await })
        };

        cancel.cancel();
        let result = waiter.await.unwrap();
        assert_eq!(result.unwrap_err(), ConcurrencyError::Cancelled("net".to_string()));
        assert_eq!(guard.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let guard = ConcurrencyGuard::new(1, "closing");
        let _held = guard.acquire().await.unwrap();
        guard.close();

        let err = guard.acquire().await.unwrap_err();
        assert!(matches!(err, ConcurrencyError::Closed(_)));
    }

    #[test]
    fn test_zero_permits_raised_to_one() {
        let guard = ConcurrencyGuard::new(0, "tiny");
        assert_eq!(guard.total_permits(), 1);
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_huge_permit_count_is_clamped() {
        let guard = ConcurrencyGuard::new(usize::MAX, "huge");
        assert_eq!(guard.total_permits(), MAX_CONCURRENCY);
        assert_eq!(guard.available_permits(), MAX_CONCURRENCY);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_ignored_shrink_keeps_permit_count() {
        let guard = ConcurrencyGuard::new(3, "shrink");
        guard.inner().shrink(usize::MAX);
        assert_eq!(guard.total_permits(), 3);
        assert_eq!(guard.available_permits(), 3);
    }

    #[tokio::test]
    async fn test_shrink_waits_for_busy_holders() {
        let guard = ConcurrencyGuard::new(3, "shrink");
        let t1 = guard.acquire().await.unwrap();
        let t2 = guard.acquire().await.unwrap();

        // One idle permit: a shrink by two cannot complete yet.
        guard.inner().shrink(2);
        assert_eq!(guard.total_permits(), 1);

        drop(t1);
        drop(t2);

        tokio::time::timeout(Duration::from_secs(1), async {
            while guard.available_permits() != 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("drain should converge");
    }

    #[test]
    fn test_debug_output() {
        let guard = ConcurrencyGuard::new(2, "debug");
        let token = guard.try_acquire().unwrap();
        let rendered = format!("{:?} {:?}", guard, token);
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("released: false"));
    }
}
