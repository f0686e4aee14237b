//! Typed attribute maps.
//!
//! Pools and pooled connections carry an [`Extensions`] map so that
//! interceptors can hang their own state off the object that owns its
//! lifetime. The statement cache keeps its pool-wide admission counter in
//! the pool's map and its per-connection store in the connection's map.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

type Entry = Arc<dyn Any + Send + Sync>;

/// A thread-safe map keyed by type.
#[derive(Default)]
pub struct Extensions {
    map: RwLock<HashMap<TypeId, Entry>>,
}

impl Extensions {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored for `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let entry = self.map.read().get(&TypeId::of::<T>()).cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Store a value for `T`, returning the previous one.
    pub fn insert<T: Any + Send + Sync>(&self, value: Arc<T>) -> Option<Arc<T>> {
        let previous = self.map.write().insert(TypeId::of::<T>(), value)?;
        previous.downcast::<T>().ok()
    }

    /// Get the value for `T`, inserting one built by `init` if absent.
    ///
    /// An existing value is never overwritten.
    pub fn get_or_insert_with<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }
        let mut map = self.map.write();
        let existing = map
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(entry).downcast::<T>().ok());
        if let Some(existing) = existing {
            return existing;
        }
        let value = Arc::new(init());
        map.insert(TypeId::of::<T>(), Arc::clone(&value) as Entry);
        value
    }

    /// Remove the value stored for `T`.
    pub fn remove<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let previous = self.map.write().remove(&TypeId::of::<T>())?;
        previous.downcast::<T>().ok()
    }

    /// Whether a value is stored for `T`.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.map.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counter(AtomicUsize);

    #[test]
    fn test_insert_and_get() {
        let ext = Extensions::new();
        assert!(ext.is_empty());
        ext.insert(Arc::new(42u32));
        assert_eq!(*ext.get::<u32>().unwrap(), 42);
        assert!(ext.get::<u64>().is_none());
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn test_get_or_insert_does_not_overwrite() {
        let ext = Extensions::new();
        let first = ext.get_or_insert_with(Counter::default);
        first.0.store(5, Ordering::SeqCst);

        let second = ext.get_or_insert_with(Counter::default);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.0.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_get_or_insert_races_to_one_value() {
        let ext = Extensions::new();
        let inits = AtomicUsize::new(0);

        let values: Vec<Arc<Counter>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        ext.get_or_insert_with(|| {
                            inits.fetch_add(1, Ordering::SeqCst);
                            Counter::default()
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert!(Arc::ptr_eq(&values[0], &ext.get::<Counter>().unwrap()));
    }

    #[test]
    fn test_remove() {
        let ext = Extensions::new();
        ext.insert(Arc::new(String::from("attr")));
        assert!(ext.contains::<String>());
        let removed = ext.remove::<String>().unwrap();
        assert_eq!(removed.as_str(), "attr");
        assert!(!ext.contains::<String>());
        assert!(ext.remove::<String>().is_none());
    }
}
