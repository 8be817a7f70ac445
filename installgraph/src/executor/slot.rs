//! Write-once result slots for passing values between tasks.
//!
//! A producer task publishes its result into a [`ResultSlot`]; a consumer
//! that depends on the producer holds a clone of the same slot and reads it
//! when it runs. The executor only starts the consumer after the producer is
//! terminal, so the write always happens before the read.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// A single-assignment cell shared between a producer and its consumers.
pub struct ResultSlot<T> {
    cell: Arc<OnceLock<T>>,
}

impl<T> ResultSlot<T> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            cell: Arc::new(OnceLock::new()),
        }
    }

    /// Publishes the value.
    ///
    /// Returns the value back if the slot was already filled.
    pub fn publish(&self, value: T) -> Result<(), T> {
        self.cell.set(value)
    }

    /// Returns the published value, if any.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Returns true once a value has been published.
    pub fn is_published(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: Clone> ResultSlot<T> {
    /// Returns a copy of the published value.
    pub fn cloned(&self) -> Option<T> {
        self.cell.get().cloned()
    }
}

impl<T> Clone for ResultSlot<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResultSlot").field(&self.cell.get()).finish()
    }
}
