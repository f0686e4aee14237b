//! Pool-wide admission counter.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts statements cached across every connection of one pool.
///
/// Registered in the pool's extensions when the pool starts and removed
/// when it closes.
#[derive(Debug, Default)]
pub struct AdmissionCounter {
    count: AtomicUsize,
}

impl AdmissionCounter {
    /// Create a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of cached statements.
    #[must_use]
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Reserve one slot if fewer than `max` are taken.
    ///
    /// Never retries once the bound is observed, and never lets the count
    /// pass `max`, even transiently.
    pub fn try_acquire(&self, max: usize) -> bool {
        if self.get() >= max {
            return false;
        }
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    /// Give back one slot.
    ///
    /// Releasing an empty counter leaves it at zero and logs a warning.
    pub fn release(&self) {
        if self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_err()
        {
            tracing::warn!("statement cache counter released more slots than it granted");
        }
    }
}
