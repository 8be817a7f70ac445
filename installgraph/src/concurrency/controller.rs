//! Process-wide download concurrency control.
//!
//! The controller hands out [`ConcurrencyGuard`]s seeded with the current
//! target concurrency and keeps weak references to them, so a later
//! [`set`](DownloadConcurrencyController::set) can resize every live guard
//! without keeping any of them alive.
//!
//! # Resizing
//!
//! ```text
//! set(6) from 4:  every live guard ──► add_permits(2)          (immediate)
//! set(2) from 4:  every live guard ──► take 2 idle permits     (immediate)
//!                                  └─► drain task waits for 2  (when busy)
//! ```
//!
//! Dead guards are pruned whenever the registry is walked.

use std::sync::{OnceLock, Weak};

use parking_lot::Mutex;

use super::guard::{ConcurrencyGuard, GuardInner, MAX_CONCURRENCY};

/// Upper bound for the default download concurrency.
pub const MAX_DEFAULT_CONCURRENCY: usize = 64;

/// Default concurrency per available CPU.
pub const CONCURRENCY_PER_CPU: usize = 4;

static GLOBAL: OnceLock<DownloadConcurrencyController> = OnceLock::new();

/// Returns `min(4 × CPU count, 64)`.
pub fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    (cpus * CONCURRENCY_PER_CPU).min(MAX_DEFAULT_CONCURRENCY)
}

struct ControllerState {
    target: usize,
    guards: Vec<Weak<GuardInner>>,
}

/// Resizable pool of download concurrency guards.
pub struct DownloadConcurrencyController {
    state: Mutex<ControllerState>,
}

impl DownloadConcurrencyController {
    /// Creates a controller with the given starting concurrency, clamped to
    /// `1..=MAX_CONCURRENCY`.
    pub fn new(initial: usize) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                target: initial.clamp(1, MAX_CONCURRENCY),
                guards: Vec::new(),
            }),
        }
    }

    /// Returns the process-wide controller, created on first use with
    /// [`default_concurrency`].
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            let initial = default_concurrency();
            tracing::info!(concurrency = initial, "Initialized download concurrency");
            Self::new(initial)
        })
    }

    /// Creates a guard seeded with the current target and registers it for
    /// future resizing.
    pub fn acquire_new_guard(&self, label: impl Into<String>) -> ConcurrencyGuard {
        let mut state = self.state.lock();
        let inner = ConcurrencyGuard::new_inner(state.target, label.into());
        state.guards.retain(|weak| weak.strong_count() > 0);
        state.guards.push(std::sync::Arc::downgrade(&inner));
        ConcurrencyGuard::from_inner(inner)
    }

    /// Changes the target concurrency and resizes every live guard.
    ///
    /// The value is clamped to `1..=MAX_CONCURRENCY`. Growing takes effect
    /// immediately; shrinking converges as busy holders release their
    /// tokens. Returns the previous target.
    pub fn set(&self, concurrency: usize) -> usize {
        let target = concurrency.clamp(1, MAX_CONCURRENCY);
        let mut state = self.state.lock();
        let previous = state.target;
        if target == previous {
            return previous;
        }
        state.target = target;

        let live: Vec<_> = state.guards.iter().filter_map(Weak::upgrade).collect();
        state.guards.retain(|weak| weak.strong_count() > 0);

        for guard in &live {
            if target > previous {
                guard.grow(target - previous);
            } else {
                guard.shrink(previous - target);
            }
        }

        tracing::info!(
            from = previous,
            to = target,
            guards = live.len(),
            "Download concurrency changed"
        );

        previous
    }

    /// Returns the current target concurrency.
    pub fn concurrency(&self) -> usize {
        self.state.lock().target
    }

    /// Returns the number of registered guards still alive.
    pub fn live_guards(&self) -> usize {
        let mut state = self.state.lock();
        state.guards.retain(|weak| weak.strong_count() > 0);
        state.guards.len()
    }
}

impl Default for DownloadConcurrencyController {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

impl std::fmt::Debug for DownloadConcurrencyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DownloadConcurrencyController")
            .field("target", &state.target)
            .field("registered", &state.guards.len())
            .finish()
    }
}
