//! Atomic statistics counters for cache and fleet operations
//!
//! Counters are updated with relaxed ordering on the hot path and read as an
//! instantaneous snapshot; totals may lag concurrent operations slightly.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Live counters maintained by the cache engine and its store
///
/// The lookup-path counters are cache-padded: hits and misses are bumped
/// from every reader thread and would otherwise share a line.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    /// Store lookups that returned a live value
    pub hits: CachePadded<AtomicU64>,
    /// Store lookups that found nothing (or a dead weak referent)
    pub misses: CachePadded<AtomicU64>,
    /// Loads whose result was shared with at least one concurrent waiter
    pub shared_loads: AtomicU64,
    /// Entries removed explicitly
    pub removed: AtomicU64,
    /// Entries removed because their expiration elapsed
    pub expired: AtomicU64,
    /// Entries evicted by the underused sweep
    pub underused: AtomicU64,
    /// Entries removed by dependency cascade
    pub dependency_removed: AtomicU64,
}

impl CacheStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self, reason: crate::cache::types::RemovalReason) {
        use crate::cache::types::RemovalReason;
        let counter = match reason {
            RemovalReason::Removed => &self.removed,
            RemovalReason::Expired => &self.expired,
            RemovalReason::Underused => &self.underused,
            RemovalReason::DependencyChanged => &self.dependency_removed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of all counters
    pub fn snapshot(&self) -> CacheStatisticsSnapshot {
        CacheStatisticsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            shared_loads: self.shared_loads.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            underused: self.underused.load(Ordering::Relaxed),
            dependency_removed: self.dependency_removed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatisticsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub shared_loads: u64,
    pub removed: u64,
    pub expired: u64,
    pub underused: u64,
    pub dependency_removed: u64,
}

impl CacheStatisticsSnapshot {
    /// Hit rate over all lookups, 0.0 when no lookups happened yet
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    /// Total removals across all reasons
    pub fn total_removals(&self) -> u64 {
        self.removed + self.expired + self.underused + self.dependency_removed
    }
}

/// Live counters maintained by the fleet sync service
#[derive(Debug, Default)]
pub struct FleetStatistics {
    /// Tasks accepted by `create_task`
    pub tasks_created: AtomicU64,
    /// Individual peer deliveries handed to the transport
    pub tasks_delivered: AtomicU64,
    /// Tasks dropped by deduplication or coalescing
    pub tasks_optimized_away: AtomicU64,
    /// Peer deliveries the transport reported as failed
    pub delivery_failures: AtomicU64,
}

impl FleetStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all counters
    pub fn snapshot(&self) -> FleetStatisticsSnapshot {
        FleetStatisticsSnapshot {
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            tasks_delivered: self.tasks_delivered.load(Ordering::Relaxed),
            tasks_optimized_away: self.tasks_optimized_away.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FleetStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetStatisticsSnapshot {
    pub tasks_created: u64,
    pub tasks_delivered: u64,
    pub tasks_optimized_away: u64,
    pub delivery_failures: u64,
}
