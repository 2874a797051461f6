//! Cache entry metadata
//!
//! An entry couples a cached value with its expiration policy, eviction
//! priority and dependency set. Exactly one of absolute or sliding
//! expiration is active; "no expiration" is its own variant, never a zero
//! deadline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::cache::types::{CachePriority, CachedValue};

/// Expiration policy of a single entry
#[derive(Debug)]
pub enum Expiration {
    /// Entry never expires on its own
    None,
    /// Entry expires at a fixed point regardless of access
    Absolute { deadline_ns: u64 },
    /// Entry expires once it has gone unaccessed for a full window
    Sliding { window_ns: u64 },
}

/// How the entry holds its value
#[derive(Debug)]
enum EntryValue<V> {
    Strong(CachedValue<V>),
    /// Weak-mode engine: the value survives only while some caller holds it
    WeakPresent(Weak<V>),
    WeakNull,
}

/// One committed cache entry with its metadata
#[derive(Debug)]
pub struct CacheEntry<V> {
    key: String,
    value: EntryValue<V>,
    expiration: Expiration,
    priority: CachePriority,
    dependencies: HashSet<String>,
    inserted_at_ns: u64,
    /// Stamp of the most recent read, drives sliding expiration and the
    /// underused sweep
    last_access_ns: AtomicU64,
}

impl<V> CacheEntry<V> {
    pub fn new(
        key: impl Into<String>,
        value: CachedValue<V>,
        expiration: Expiration,
        priority: CachePriority,
        dependencies: HashSet<String>,
        now_ns: u64,
        weak: bool,
    ) -> Self {
        let value = if weak {
            match value {
                CachedValue::Present(arc) => EntryValue::WeakPresent(Arc::downgrade(&arc)),
                CachedValue::Null => EntryValue::WeakNull,
            }
        } else {
            EntryValue::Strong(value)
        };
        Self {
            key: key.into(),
            value,
            expiration,
            priority,
            dependencies,
            inserted_at_ns: now_ns,
            last_access_ns: AtomicU64::new(now_ns),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn priority(&self) -> CachePriority {
        self.priority
    }

    pub fn expiration(&self) -> &Expiration {
        &self.expiration
    }

    pub fn inserted_at_ns(&self) -> u64 {
        self.inserted_at_ns
    }

    /// Whether this entry's dependency set contains the given key
    pub fn depends_on(&self, key: &str) -> bool {
        self.dependencies.contains(key)
    }

    pub fn dependencies(&self) -> &HashSet<String> {
        &self.dependencies
    }

    /// Live value of this entry, `None` when a weak referent was reclaimed
    pub fn live_value(&self) -> Option<CachedValue<V>> {
        match &self.value {
            EntryValue::Strong(value) => Some(value.clone()),
            EntryValue::WeakPresent(weak) => weak.upgrade().map(CachedValue::Present),
            EntryValue::WeakNull => Some(CachedValue::Null),
        }
    }

    /// Record an access, resetting the sliding window
    pub fn touch(&self, now_ns: u64) {
        self.last_access_ns.store(now_ns, Ordering::Release);
    }

    /// Nanoseconds since the last access
    pub fn idle_ns(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.last_access_ns.load(Ordering::Acquire))
    }

    /// Whether the entry's expiration has elapsed
    pub fn is_expired(&self, now_ns: u64) -> bool {
        match self.expiration {
            Expiration::None => false,
            Expiration::Absolute { deadline_ns } => now_ns > deadline_ns,
            Expiration::Sliding { window_ns } => self.idle_ns(now_ns) > window_ns,
        }
    }
}
