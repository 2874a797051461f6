//! Per-key single-flight load protocol
//!
//! Each in-flight cache key owns one [`LockSlot`], an explicit
//! `Idle -> Loading -> Done | Failed` state machine on a mutex/condvar pair.
//! The first caller to reach the slot becomes the loader; every concurrent
//! caller for the same key parks until the slot resolves and then shares the
//! loader's result. There is no timeout in this protocol; callers that need
//! bounded latency must layer their own cancellation.
//!
//! A slot lives for exactly one load generation: it is created on a miss and
//! removed from the registry as soon as it resolves, so the next miss for the
//! key starts a fresh flight. A `Failed` slot releases its waiters into
//! independent retries rather than handing them the error; the failure is
//! surfaced only to the caller whose loader raised it.
//!
//! The same slot handshake also backs progressive caching: callers
//! synchronize through the slot even when the result will not be committed
//! to the store, so one expensive computation is shared instead of repeated
//! by every concurrent caller.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use dashmap::DashMap;

use crate::cache::types::{CacheOperationError, CachedValue};

/// Resolution states of an in-flight load
#[derive(Debug)]
enum SlotState<V> {
    /// Slot created, loader not yet chosen
    Idle,
    /// A loader thread is running the computation
    Loading,
    /// Load finished; the shared result is available to all waiters
    Done(CachedValue<V>),
    /// Load failed; waiters must retry on their own
    Failed(CacheOperationError),
}

/// One in-flight load for one key
#[derive(Debug)]
pub struct LockSlot<V> {
    state: Mutex<SlotState<V>>,
    resolved: Condvar,
    /// Threads currently parked on this slot
    waiters: AtomicUsize,
    /// Load generation, for diagnostics
    generation: u64,
}

impl<V> LockSlot<V> {
    fn new(generation: u64) -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
            resolved: Condvar::new(),
            waiters: AtomicUsize::new(0),
            generation,
        }
    }

    /// Load generation this slot belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Threads currently parked on this slot
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, SlotState<V>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// What a parked waiter observed once its slot resolved
#[derive(Debug)]
pub enum WaitOutcome<V> {
    /// The loader succeeded; this is its shared result
    Shared(CachedValue<V>),
    /// The loader failed; the waiter must retry the load itself
    Retry,
}

/// Role assigned to a caller entering the protocol for a key
pub enum FlightRole<V> {
    /// This caller won the slot and must run the loader
    Loader(LoaderPermit<V>),
    /// Another caller is loading; park on the slot
    Waiter(FlightWaiter<V>),
}

/// Registry of in-flight slots, one per key
#[derive(Debug)]
pub struct LockRegistry<V> {
    slots: Arc<DashMap<String, Arc<LockSlot<V>>>>,
    generation: AtomicU64,
}

impl<V> Default for LockRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LockRegistry<V> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Enter the single-flight protocol for a key
    ///
    /// Exactly one concurrent caller per generation receives
    /// [`FlightRole::Loader`]; everyone else receives a waiter handle on the
    /// same slot.
    pub fn begin(&self, key: &str) -> FlightRole<V> {
        let slot = self
            .slots
            .entry(key.to_owned())
            .or_insert_with(|| {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel);
                Arc::new(LockSlot::new(generation))
            })
            .clone();

        // The map shard lock is released above; slot state is taken on its own.
        let mut state = slot.lock_state();
        match *state {
            SlotState::Idle => {
                *state = SlotState::Loading;
                drop(state);
                FlightRole::Loader(LoaderPermit {
                    key: key.to_owned(),
                    slot,
                    slots: Arc::clone(&self.slots),
                    resolved: false,
                })
            }
            _ => {
                drop(state);
                FlightRole::Waiter(FlightWaiter { slot })
            }
        }
    }

    /// Number of keys currently in flight
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }
}

/// Loader-side handle for resolving a slot
///
/// Dropping the permit without resolving it marks the slot `Failed` so that
/// waiters are never left parked behind a loader that unwound.
pub struct LoaderPermit<V> {
    key: String,
    slot: Arc<LockSlot<V>>,
    slots: Arc<DashMap<String, Arc<LockSlot<V>>>>,
    resolved: bool,
}

impl<V> LoaderPermit<V> {
    /// Key this flight is loading
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish the load result and release all waiters
    ///
    /// Returns the number of waiters that were parked on the slot, so the
    /// caller can account for shared loads.
    pub fn complete(mut self, value: CachedValue<V>) -> usize {
        self.resolve(SlotState::Done(value))
    }

    /// Mark the load failed and release all waiters into retry
    pub fn fail(mut self, error: CacheOperationError) -> usize {
        self.resolve(SlotState::Failed(error))
    }

    fn resolve(&mut self, outcome: SlotState<V>) -> usize {
        let released;
        {
            let mut state = self.slot.lock_state();
            *state = outcome;
            released = self.slot.waiters.load(Ordering::Acquire);
            self.slot.resolved.notify_all();
        }
        // This generation is over; the next miss starts a fresh slot.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::ptr_eq(slot, &self.slot));
        self.resolved = true;
        released
    }
}

impl<V> Drop for LoaderPermit<V> {
    fn drop(&mut self) {
        if !self.resolved {
            self.resolve(SlotState::Failed(CacheOperationError::load_failed(
                "loader released its permit without producing a result",
            )));
        }
    }
}

impl<V> std::fmt::Debug for LoaderPermit<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderPermit")
            .field("key", &self.key)
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// Waiter-side handle parked on an in-flight slot
#[derive(Debug)]
pub struct FlightWaiter<V> {
    slot: Arc<LockSlot<V>>,
}

impl<V> FlightWaiter<V> {
    /// Park until the slot resolves
    ///
    /// The loader's resolution happens-before this returns: the state write
    /// is published under the slot mutex, so every waiter observes the
    /// committed outcome.
    pub fn wait(self) -> WaitOutcome<V> {
        let mut state = self.slot.lock_state();
        self.slot.waiters.fetch_add(1, Ordering::AcqRel);
        while matches!(*state, SlotState::Idle | SlotState::Loading) {
            state = match self.slot.resolved.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        self.slot.waiters.fetch_sub(1, Ordering::AcqRel);
        match &*state {
            SlotState::Done(value) => WaitOutcome::Shared(value.clone()),
            SlotState::Failed(_) => WaitOutcome::Retry,
            SlotState::Idle | SlotState::Loading => {
                // Unreachable: the loop above only exits on a resolved state.
                WaitOutcome::Retry
            }
        }
    }
}
