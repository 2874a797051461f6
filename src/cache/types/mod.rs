//! Core cache data types
//!
//! Value envelope with an explicit null sentinel, eviction priorities,
//! removal reasons, error taxonomy and statistics counters.

pub mod error;
pub mod statistics;

pub use error::CacheOperationError;
pub use statistics::{
    CacheStatistics, CacheStatisticsSnapshot, FleetStatistics, FleetStatisticsSnapshot,
};

use std::sync::Arc;

/// Cached value envelope distinguishing "legitimately nothing" from "absent"
///
/// A lookup that resolves to no value is a valid, cacheable outcome and must
/// not be confused with a key that was never computed. `Null` carries that
/// outcome; key absence is expressed by `Option::None` at the store API.
#[derive(Debug)]
pub enum CachedValue<V> {
    /// A computed value, shared between the store and all readers
    Present(Arc<V>),
    /// The computation legitimately produced no value
    Null,
}

impl<V> CachedValue<V> {
    /// Wrap an owned value
    #[inline(always)]
    pub fn present(value: V) -> Self {
        Self::Present(Arc::new(value))
    }

    /// Shared reference to the value, `None` for the null sentinel
    pub fn value(&self) -> Option<&Arc<V>> {
        match self {
            Self::Present(value) => Some(value),
            Self::Null => None,
        }
    }

    /// Whether this is the null sentinel
    #[inline(always)]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

// Manual impl: `V` itself need not be Clone, only the Arc is cloned.
impl<V> Clone for CachedValue<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Present(value) => Self::Present(Arc::clone(value)),
            Self::Null => Self::Null,
        }
    }
}

impl<V: PartialEq> PartialEq for CachedValue<V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Present(a), Self::Present(b)) => a == b,
            (Self::Null, Self::Null) => true,
            _ => false,
        }
    }
}

impl<V> From<Option<V>> for CachedValue<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(value) => Self::present(value),
            None => Self::Null,
        }
    }
}

/// Eviction priority attached to each cache entry
///
/// `NotRemovable` entries are never reclaimed by pressure-based eviction;
/// only explicit removal or dependency invalidation takes them out.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    NotRemovable,
}

impl CachePriority {
    /// Whether pressure-based reclamation may evict entries of this priority
    #[inline(always)]
    pub fn is_evictable(&self) -> bool {
        !matches!(self, Self::NotRemovable)
    }
}

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RemovalReason {
    /// Explicit removal by a caller
    Removed,
    /// Absolute deadline passed or sliding window elapsed
    Expired,
    /// Evicted by the underused sweep under entry pressure
    Underused,
    /// A key in the entry's dependency set was invalidated
    DependencyChanged,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Removed => write!(f, "removed"),
            RemovalReason::Expired => write!(f, "expired"),
            RemovalReason::Underused => write!(f, "underused"),
            RemovalReason::DependencyChanged => write!(f, "dependency-changed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_value_null_is_distinct_from_absent() {
        let null: CachedValue<String> = CachedValue::Null;
        assert!(null.is_null());
        assert!(null.value().is_none());

        let present = CachedValue::present("x".to_string());
        assert!(!present.is_null());
        assert_eq!(present.value().map(|v| v.as_str()), Some("x"));
    }

    #[test]
    fn test_priority_evictability() {
        assert!(CachePriority::Low.is_evictable());
        assert!(CachePriority::High.is_evictable());
        assert!(!CachePriority::NotRemovable.is_evictable());
    }
}
