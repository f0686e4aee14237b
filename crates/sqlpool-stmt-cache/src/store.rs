//! Per-connection statement store.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use parking_lot::Mutex;

use crate::error::{RejectReason, Rejected};
use crate::key::CacheKey;
use crate::statement::CachedStatement;

/// Idle cached statements of one physical connection, keyed by
/// [`CacheKey`].
///
/// Lives in the connection's extensions. Values removed from the map are
/// always handed back to the caller so that closing them never happens
/// under the map lock. Once drained for teardown the store stays closed and
/// refuses new entries.
#[derive(Default)]
pub struct ConnectionStore {
    slots: Mutex<Slots>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<CacheKey, CachedStatement>,
    closed: bool,
}

impl ConnectionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a statement is cached under `key`.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.lock().entries.contains_key(key)
    }

    /// Number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().entries.is_empty()
    }

    /// Keys currently cached, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        self.slots.lock().entries.keys().cloned().collect()
    }

    /// Remove and return the statement cached under `key`.
    pub(crate) fn take(&self, key: &CacheKey) -> Option<CachedStatement> {
        self.slots.lock().entries.remove(key)
    }

    /// Whether the store was drained for teardown.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    /// Insert `statement` unless `key` is already taken or the store is
    /// closed.
    pub(crate) fn insert_vacant(&self, key: CacheKey, statement: CachedStatement) -> Result<(), Rejected> {
        let mut slots = self.slots.lock();
        if slots.closed {
            return Err(Rejected::new(RejectReason::Unbound, statement));
        }
        match slots.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(statement);
                Ok(())
            }
            Entry::Occupied(_) => Err(Rejected::new(RejectReason::Duplicate, statement)),
        }
    }

    /// Remove every cached statement and close the store.
    pub(crate) fn drain(&self) -> Vec<CachedStatement> {
        let entries = {
            let mut slots = self.slots.lock();
            slots.closed = true;
            std::mem::take(&mut slots.entries)
        };
        entries.into_values().collect()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookups answered from this store.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ConnectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStore")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
