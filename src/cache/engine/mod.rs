//! Cache engine orchestrating store, single-flight loads and invalidation
//!
//! `get_or_compute` is the main entry point: consult the store, and on a
//! miss run the loader under the single-flight protocol so concurrent demand
//! for one key costs one computation. Committed entries carry expiration,
//! priority and dependency metadata; invalidation fans out through the
//! [`InvalidationBus`] and cascades across dependency sets.

pub mod entry;
pub mod settings;
mod sweeper;

pub use entry::{CacheEntry, Expiration};
pub use settings::{CacheSettings, CacheSettingsBuilder, DependencySource, item_name_from_parts};

use std::sync::Arc;
use std::sync::atomic::Ordering;

use log::debug;

use crate::cache::clock::{Clock, SystemClock, minutes_to_ns};
use crate::cache::config::CacheConfig;
use crate::cache::events::{InvalidationBus, RemovedEvent};
use crate::cache::singleflight::{FlightRole, LockRegistry, WaitOutcome};
use crate::cache::store::ConcurrentStore;
use crate::cache::types::{
    CacheOperationError, CachePriority, CacheStatistics, CacheStatisticsSnapshot, CachedValue,
    RemovalReason,
};

use self::sweeper::SweeperHandle;

/// Progressive caching engine
///
/// Shared freely across threads via `Arc`; every method takes `&self`.
/// Dropping the last engine handle stops the maintenance worker.
#[derive(Debug)]
pub struct CacheEngine<V: Send + Sync + 'static> {
    inner: Arc<EngineInner<V>>,
    sweeper: Option<SweeperHandle>,
}

#[derive(Debug)]
pub(crate) struct EngineInner<V: Send + Sync + 'static> {
    config: CacheConfig,
    store: ConcurrentStore<CacheEntry<V>>,
    flights: LockRegistry<V>,
    bus: InvalidationBus<V>,
    clock: Arc<dyn Clock>,
    stats: CacheStatistics,
}

impl<V: Send + Sync + 'static> CacheEngine<V> {
    /// Create an engine on the system clock
    pub fn new(config: CacheConfig) -> Result<Self, CacheOperationError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine on an injected clock
    pub fn with_clock(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheOperationError> {
        config.validate()?;
        let inner = Arc::new(EngineInner {
            config,
            store: ConcurrentStore::new(),
            flights: LockRegistry::new(),
            bus: InvalidationBus::new(),
            clock,
            stats: CacheStatistics::new(),
        });
        let sweeper = SweeperHandle::spawn(
            Arc::downgrade(&inner),
            inner.config.sweep_interval_ms,
        )?;
        Ok(Self {
            inner,
            sweeper: Some(sweeper),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Invalidation event bus
    pub fn bus(&self) -> &InvalidationBus<V> {
        &self.inner.bus
    }

    /// Snapshot of the engine's counters
    pub fn statistics(&self) -> CacheStatisticsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of committed entries, dead weak referents included
    pub fn entry_count(&self) -> usize {
        self.inner.store.raw_count()
    }

    /// Look up a key without loading
    pub fn get(&self, key: &str) -> Option<CachedValue<V>> {
        let outcome = self.inner.lookup(&key.to_lowercase());
        match &outcome {
            Some(_) => self.inner.stats.record_hit(),
            None => self.inner.stats.record_miss(),
        }
        outcome
    }

    /// Whether a live, unexpired entry exists for the key
    pub fn contains(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        let now_ns = self.inner.clock.now_ns();
        match self.inner.peek_entry(&key) {
            Some(entry) => !entry.is_expired(now_ns) && entry.live_value().is_some(),
            None => false,
        }
    }

    /// Get the cached value for the settings' item name, or compute it
    ///
    /// At most one concurrent caller per key runs the loader; the rest share
    /// its result. A loader failure is returned to the caller whose loader
    /// raised it, while parked waiters retry the load independently, with
    /// no backoff, so sustained failure under heavy concurrency repeats the
    /// load once per waiter (a known fairness tradeoff of the protocol).
    ///
    /// A loader that resolves to "no value" (`Ok(None)`) caches the null
    /// sentinel; only `Err` disables caching for the call.
    pub fn get_or_compute<F>(
        &self,
        settings: CacheSettings,
        loader: F,
    ) -> Result<CachedValue<V>, CacheOperationError>
    where
        F: FnOnce() -> Result<Option<V>, CacheOperationError>,
    {
        let key = settings.item_name().to_owned();
        let cached = settings.is_cached();
        let progressive =
            settings.allow_progressive() && self.inner.config.allow_progressive_caching;

        // Neither cached nor coordinated: run the loader as-is.
        if !cached && !progressive {
            return loader().map(CachedValue::from);
        }

        let mut loader = Some(loader);
        let mut settings = Some(settings);
        loop {
            if cached {
                if let Some(hit) = self.inner.lookup(&key) {
                    self.inner.stats.record_hit();
                    return Ok(hit);
                }
                self.inner.stats.record_miss();
            }

            match self.inner.flights.begin(&key) {
                FlightRole::Loader(permit) => {
                    // Re-check after winning the permit: a previous
                    // generation may have committed between this call's
                    // lookup and its slot acquisition.
                    if cached {
                        if let Some(hit) = self.inner.lookup(&key) {
                            self.inner.stats.record_hit();
                            permit.complete(hit.clone());
                            return Ok(hit);
                        }
                    }
                    let Some(load) = loader.take() else {
                        return Err(CacheOperationError::invalid_state(
                            "single-flight loader invoked twice for one call",
                        ));
                    };
                    return match load() {
                        Ok(value) => {
                            let value = CachedValue::from(value);
                            if cached {
                                if let Some(settings) = settings.take() {
                                    self.inner.commit(&key, settings, value.clone());
                                }
                            }
                            let released = permit.complete(value.clone());
                            if released > 0 {
                                self.inner
                                    .stats
                                    .shared_loads
                                    .fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(value)
                        }
                        Err(error) => {
                            permit.fail(error.clone());
                            Err(error)
                        }
                    };
                }
                FlightRole::Waiter(waiter) => match waiter.wait() {
                    WaitOutcome::Shared(value) => return Ok(value),
                    // The failed generation was discarded; retry the load.
                    WaitOutcome::Retry => continue,
                },
            }
        }
    }

    /// Remove a key explicitly, cascading through dependent entries
    pub fn remove(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        let removed = self.inner.remove_single(&key, RemovalReason::Removed);
        self.inner.cascade_dependents(vec![key]);
        removed
    }

    /// Invalidate a dependency key
    ///
    /// Removes the entry for the key if one exists and cascades through
    /// every entry depending on it. Dependency keys need not have entries
    /// of their own.
    pub fn touch(&self, key: &str) {
        self.remove(key);
    }

    /// Remove every entry whose key starts with the given prefix
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        let prefix = prefix.to_lowercase();
        let mut removed = Vec::new();
        for key in self.inner.store.keys() {
            if key.starts_with(&prefix) && self.inner.remove_single(&key, RemovalReason::Removed) {
                removed.push(key);
            }
        }
        let count = removed.len();
        self.inner.cascade_dependents(removed);
        count
    }

    /// Drop every entry and notify clear-all subscribers
    pub fn clear(&self, log_to_fleet: bool) -> usize {
        let count = self.inner.store.clear();
        self.inner.bus.emit_clear_all(log_to_fleet);
        debug!("cache cleared, {} entries dropped", count);
        count
    }

    /// Run one maintenance pass now: expiration, dead weak referents, and
    /// the underused sweep
    pub fn run_sweep(&self) {
        self.inner.run_sweep();
    }
}

impl<V: Send + Sync + 'static> Drop for CacheEngine<V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
    }
}

impl<V: Send + Sync + 'static> EngineInner<V> {
    /// Entry for a key, without touching access metadata
    fn peek_entry(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.store.get(key).and_then(|stored| stored.value().cloned())
    }

    /// Hit-path lookup: expired entries read as misses and are reclaimed
    fn lookup(&self, key: &str) -> Option<CachedValue<V>> {
        let now_ns = self.clock.now_ns();
        let entry = self.peek_entry(key)?;
        if entry.is_expired(now_ns) {
            if self.remove_expired(key, now_ns) {
                self.cascade_dependents(vec![key.to_owned()]);
            }
            return None;
        }
        match entry.live_value() {
            Some(value) => {
                entry.touch(now_ns);
                Some(value)
            }
            None => {
                // Weak referent reclaimed since commit.
                self.remove_single(key, RemovalReason::Underused);
                None
            }
        }
    }

    /// Commit a loaded value with the settings' metadata
    fn commit(&self, key: &str, settings: CacheSettings, value: CachedValue<V>) {
        let now_ns = self.clock.now_ns();
        let window_ns = minutes_to_ns(settings.cache_minutes());
        let expiration = if settings.sliding() {
            Expiration::Sliding { window_ns }
        } else {
            Expiration::Absolute {
                deadline_ns: now_ns.saturating_add(window_ns),
            }
        };
        let priority = settings.priority();
        // Lazy dependency providers run here, at most once, and only
        // because the value is actually being committed.
        let dependencies = settings.into_dependencies().into_iter().collect();
        let entry = CacheEntry::new(
            key,
            value,
            expiration,
            priority,
            dependencies,
            now_ns,
            self.config.weak_values,
        );
        self.store.set(key, CachedValue::present(entry));
    }

    /// Remove one key and report it; no cascade
    fn remove_single(&self, key: &str, reason: RemovalReason) -> bool {
        let Some(stored) = self.store.remove(key) else {
            return false;
        };
        let value = stored.value().and_then(|entry| entry.live_value());
        self.stats.record_removal(reason);
        self.bus.emit_removed(&RemovedEvent {
            key: key.to_owned(),
            value,
            reason,
        });
        true
    }

    /// Remove one key only if it is still expired at `now_ns`
    ///
    /// Guards against racing a concurrent refresh between the expiration
    /// check and the removal.
    fn remove_expired(&self, key: &str, now_ns: u64) -> bool {
        let removed = self
            .store
            .remove_if(key, |stored| {
                stored
                    .value()
                    .map(|entry| entry.is_expired(now_ns))
                    .unwrap_or(true)
            })
            .is_some();
        if removed {
            self.stats.record_removal(RemovalReason::Expired);
            self.bus.emit_removed(&RemovedEvent {
                key: key.to_owned(),
                value: None,
                reason: RemovalReason::Expired,
            });
        }
        removed
    }

    /// Remove every entry whose dependency set intersects an invalidated key
    ///
    /// Runs transitively: a removed dependent invalidates its own key for
    /// the entries depending on it. Terminates because each removal shrinks
    /// the store.
    fn cascade_dependents(&self, seeds: Vec<String>) {
        let mut pending = seeds;
        while let Some(changed) = pending.pop() {
            for candidate in self.store.keys() {
                let Some(entry) = self.peek_entry(&candidate) else {
                    continue;
                };
                if entry.depends_on(&changed)
                    && self.remove_single(&candidate, RemovalReason::DependencyChanged)
                {
                    pending.push(candidate);
                }
            }
        }
    }

    /// One maintenance pass over the whole store
    pub(crate) fn run_sweep(&self) {
        let now_ns = self.clock.now_ns();
        let mut invalidated = Vec::new();

        for key in self.store.keys() {
            let Some(entry) = self.peek_entry(&key) else {
                // Dead weak handle at the store layer.
                self.store.remove(&key);
                continue;
            };
            if entry.is_expired(now_ns) {
                if self.remove_expired(&key, now_ns) {
                    invalidated.push(key);
                }
            } else if entry.live_value().is_none()
                && self.remove_single(&key, RemovalReason::Underused)
            {
                invalidated.push(key);
            }
        }

        self.sweep_underused(now_ns, &mut invalidated);

        if !invalidated.is_empty() {
            debug!("maintenance sweep reclaimed {} entries", invalidated.len());
            self.cascade_dependents(invalidated);
        }
    }

    /// Evict idle, evictable entries while the store exceeds its soft limit
    ///
    /// Lowest priority goes first, longest idle first within a priority.
    /// `NotRemovable` entries are never candidates.
    fn sweep_underused(&self, now_ns: u64, invalidated: &mut Vec<String>) {
        let over = self
            .store
            .raw_count()
            .saturating_sub(self.config.soft_entry_limit);
        if over == 0 {
            return;
        }
        let idle_floor_ns = self.config.underused_idle_ms.saturating_mul(1_000_000);

        let mut candidates: Vec<(String, CachePriority, u64)> = self
            .store
            .keys()
            .into_iter()
            .filter_map(|key| {
                let entry = self.peek_entry(&key)?;
                let idle_ns = entry.idle_ns(now_ns);
                (entry.priority().is_evictable() && idle_ns > idle_floor_ns)
                    .then(|| (key, entry.priority(), idle_ns))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));

        for (key, _, _) in candidates.into_iter().take(over) {
            if self.remove_single(&key, RemovalReason::Underused) {
                invalidated.push(key);
            }
        }
    }
}
