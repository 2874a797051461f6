//! Thread-safe associative container with weak-reference support
//!
//! Reads (`get`, `contains_key`) go straight to the concurrent map and never
//! block writers or other readers. Mutations (`set`, `remove`, `clear`)
//! serialize through a single writer critical section per store instance.
//!
//! In weak-reference mode, `set` downgrades the stored `Arc` so the entry can
//! be reclaimed once every caller drops its handle; `get` reports a reclaimed
//! referent as not-found. The null sentinel survives weak mode unchanged
//! since there is no referent to reclaim.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dashmap::DashMap;

use crate::cache::types::{CacheOperationError, CachedValue};

/// Stored form of a value, strong or reclaimable
#[derive(Debug)]
enum StoredHandle<V> {
    Strong(CachedValue<V>),
    WeakPresent(Weak<V>),
    WeakNull,
}

impl<V> StoredHandle<V> {
    /// Live value behind this handle, `None` when the referent was reclaimed
    fn live(&self) -> Option<CachedValue<V>> {
        match self {
            Self::Strong(value) => Some(value.clone()),
            Self::WeakPresent(weak) => weak.upgrade().map(CachedValue::Present),
            Self::WeakNull => Some(CachedValue::Null),
        }
    }
}

/// Concurrent key/value store with an explicit null sentinel
#[derive(Debug)]
pub struct ConcurrentStore<V> {
    entries: DashMap<String, StoredHandle<V>>,
    /// Single writer critical section; the read path never takes it
    writer_lock: Mutex<()>,
    weak_values: bool,
}

impl<V> Default for ConcurrentStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ConcurrentStore<V> {
    /// Create a store holding values strongly
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            writer_lock: Mutex::new(()),
            weak_values: false,
        }
    }

    /// Create a store holding values behind weak references
    pub fn with_weak_values() -> Self {
        Self {
            entries: DashMap::new(),
            writer_lock: Mutex::new(()),
            weak_values: true,
        }
    }

    /// Whether this store holds values weakly
    #[inline(always)]
    pub fn is_weak(&self) -> bool {
        self.weak_values
    }

    /// Acquire the writer critical section, recovering a poisoned lock
    ///
    /// The guard protects no data of its own; a panicked writer leaves the
    /// concurrent map in a consistent state, so the poison flag is cleared
    /// rather than propagated.
    fn writer_guard(&self) -> MutexGuard<'_, ()> {
        match self.writer_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up a key without blocking
    ///
    /// Returns `None` for an absent key, and also for a weak entry whose
    /// referent has been reclaimed. `Some(CachedValue::Null)` is a hit on the
    /// null sentinel.
    pub fn get(&self, key: &str) -> Option<CachedValue<V>> {
        self.entries.get(key).and_then(|entry| entry.value().live())
    }

    /// Whether a live entry exists for the key, without blocking
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.value().live().is_some())
            .unwrap_or(false)
    }

    /// Insert or replace the value for a key
    pub fn set(&self, key: impl Into<String>, value: CachedValue<V>) {
        let handle = if self.weak_values {
            match value {
                CachedValue::Present(arc) => StoredHandle::WeakPresent(Arc::downgrade(&arc)),
                CachedValue::Null => StoredHandle::WeakNull,
            }
        } else {
            StoredHandle::Strong(value)
        };
        let _writer = self.writer_guard();
        self.entries.insert(key.into(), handle);
    }

    /// Remove a key, returning its live value if there was one
    pub fn remove(&self, key: &str) -> Option<CachedValue<V>> {
        let _writer = self.writer_guard();
        self.entries.remove(key).and_then(|(_, handle)| handle.live())
    }

    /// Remove a key only if its live value satisfies the predicate
    ///
    /// A weak entry whose referent is already dead is removed
    /// unconditionally. Returns the removed live value, if any.
    pub fn remove_if(
        &self,
        key: &str,
        predicate: impl FnOnce(&CachedValue<V>) -> bool,
    ) -> Option<CachedValue<V>> {
        let _writer = self.writer_guard();
        self.entries
            .remove_if(key, |_, handle| match handle.live() {
                Some(value) => predicate(&value),
                None => true,
            })
            .and_then(|(_, handle)| handle.live())
    }

    /// Remove every entry, returning how many were dropped
    pub fn clear(&self) -> usize {
        let _writer = self.writer_guard();
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Snapshot of all keys currently present, live or not
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Raw entry count including weak entries whose referent may be dead
    pub fn raw_count(&self) -> usize {
        self.entries.len()
    }

    /// Count of live entries, taken under the writer lock
    ///
    /// In weak mode only entries whose referent is still alive are counted.
    /// The result is an instantaneous snapshot: referents can be reclaimed
    /// during or immediately after the walk.
    pub fn real_count(&self) -> usize {
        let _writer = self.writer_guard();
        if !self.weak_values {
            return self.entries.len();
        }
        self.entries
            .iter()
            .filter(|entry| entry.value().live().is_some())
            .count()
    }

    /// Drop weak entries whose referent has been reclaimed
    ///
    /// Returns the keys that were purged so callers can report them.
    pub fn purge_dead(&self) -> Vec<String> {
        if !self.weak_values {
            return Vec::new();
        }
        let _writer = self.writer_guard();
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().live().is_none())
            .map(|entry| entry.key().clone())
            .collect();
        for key in &dead {
            self.entries.remove(key);
        }
        dead
    }
}

impl<V: PartialEq> ConcurrentStore<V> {
    /// Whether any live entry equals the given value
    ///
    /// Unsupported in weak mode: weakly held values cannot be safely
    /// enumerated by value, so this is a hard error rather than a silently
    /// wrong `false`.
    pub fn contains_value(&self, value: &V) -> Result<bool, CacheOperationError> {
        if self.weak_values {
            return Err(CacheOperationError::unsupported_operation(
                "value-containment scan on a weak-reference store",
            ));
        }
        let _writer = self.writer_guard();
        let found = self.entries.iter().any(|entry| match entry.value() {
            StoredHandle::Strong(CachedValue::Present(stored)) => stored.as_ref() == value,
            _ => false,
        });
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_distinguishes_null_from_absent() {
        let store: ConcurrentStore<String> = ConcurrentStore::new();
        assert!(store.get("missing").is_none());

        store.set("nothing", CachedValue::Null);
        match store.get("nothing") {
            Some(CachedValue::Null) => {}
            other => panic!("expected null sentinel, got {:?}", other),
        }
    }

    #[test]
    fn test_set_remove_roundtrip() {
        let store = ConcurrentStore::new();
        store.set("k", CachedValue::present(42u32));
        assert!(store.contains_key("k"));
        assert_eq!(
            store.get("k").and_then(|v| v.value().map(|a| **a)),
            Some(42)
        );

        let removed = store.remove("k");
        assert!(removed.is_some());
        assert!(store.get("k").is_none());
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn test_weak_store_drops_reclaimed_referents() {
        let store: ConcurrentStore<String> = ConcurrentStore::with_weak_values();
        let held = Arc::new("alive".to_string());
        store.set("held", CachedValue::Present(Arc::clone(&held)));
        store.set(
            "dropped",
            CachedValue::Present(Arc::new("transient".to_string())),
        );

        // Nothing holds "dropped" any more, so it reads as absent.
        assert!(store.get("dropped").is_none());
        assert!(!store.contains_key("dropped"));
        assert_eq!(
            store.get("held").and_then(|v| v.value().cloned()),
            Some(held.clone())
        );

        assert_eq!(store.real_count(), 1);
        assert_eq!(store.raw_count(), 2);

        let purged = store.purge_dead();
        assert_eq!(purged, vec!["dropped".to_string()]);
        assert_eq!(store.raw_count(), 1);
    }

    #[test]
    fn test_weak_store_keeps_null_sentinel() {
        let store: ConcurrentStore<String> = ConcurrentStore::with_weak_values();
        store.set("nothing", CachedValue::Null);
        assert!(matches!(store.get("nothing"), Some(CachedValue::Null)));
        assert_eq!(store.real_count(), 1);
    }

    #[test]
    fn test_contains_value_unsupported_in_weak_mode() {
        let weak: ConcurrentStore<u32> = ConcurrentStore::with_weak_values();
        assert!(matches!(
            weak.contains_value(&1),
            Err(CacheOperationError::UnsupportedOperation(_))
        ));

        let strong = ConcurrentStore::new();
        strong.set("one", CachedValue::present(1u32));
        assert_eq!(strong.contains_value(&1), Ok(true));
        assert_eq!(strong.contains_value(&2), Ok(false));
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        use std::thread;

        let store = Arc::new(ConcurrentStore::new());
        let mut handles = Vec::new();

        for worker in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..250 {
                    let key = format!("k{}", (worker * 250 + i) % 100);
                    store.set(key.clone(), CachedValue::present(i as u64));
                    let _ = store.get(&key);
                    if i % 7 == 0 {
                        store.remove(&key);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker panicked");
        }
        assert!(store.real_count() <= 100);
    }
}
