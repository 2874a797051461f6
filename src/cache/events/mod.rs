//! Invalidation event fan-out
//!
//! Synchronous in-process notifications fired when entries leave the cache
//! or the whole cache is cleared. There is no queueing: subscribers run on
//! the invalidating thread, in registration order, before the invalidation
//! call returns. Subscribers live for the engine's lifetime.

use std::sync::RwLock;

use crate::cache::types::{CachedValue, RemovalReason};

/// Payload handed to item-removed subscribers
#[derive(Debug, Clone)]
pub struct RemovedEvent<V> {
    /// Canonical key of the removed entry
    pub key: String,
    /// The removed value, when it was still live at removal time
    pub value: Option<CachedValue<V>>,
    /// Why the entry left the cache
    pub reason: RemovalReason,
}

type RemovedSubscriber<V> = Box<dyn Fn(&RemovedEvent<V>) + Send + Sync>;
type ClearSubscriber = Box<dyn Fn(bool) + Send + Sync>;

/// Observable bus for cache invalidation events
pub struct InvalidationBus<V> {
    removed: RwLock<Vec<RemovedSubscriber<V>>>,
    cleared: RwLock<Vec<ClearSubscriber>>,
}

impl<V> Default for InvalidationBus<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InvalidationBus<V> {
    pub fn new() -> Self {
        Self {
            removed: RwLock::new(Vec::new()),
            cleared: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to item removals
    pub fn on_item_removed(&self, subscriber: impl Fn(&RemovedEvent<V>) + Send + Sync + 'static) {
        let mut subscribers = match self.removed.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push(Box::new(subscriber));
    }

    /// Subscribe to full-cache clears; the flag is the caller's
    /// log-to-fleet intent
    pub fn on_clear_all(&self, subscriber: impl Fn(bool) + Send + Sync + 'static) {
        let mut subscribers = match self.cleared.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push(Box::new(subscriber));
    }

    /// Fan an item-removed event out to all subscribers, synchronously
    pub fn emit_removed(&self, event: &RemovedEvent<V>) {
        let subscribers = match self.removed.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for subscriber in subscribers.iter() {
            subscriber(event);
        }
    }

    /// Fan a clear-all event out to all subscribers, synchronously
    pub fn emit_clear_all(&self, log_to_fleet: bool) {
        let subscribers = match self.cleared.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for subscriber in subscribers.iter() {
            subscriber(log_to_fleet);
        }
    }
}

impl<V> std::fmt::Debug for InvalidationBus<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let removed = self.removed.read().map(|s| s.len()).unwrap_or(0);
        let cleared = self.cleared.read().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("InvalidationBus")
            .field("removed_subscribers", &removed)
            .field("clear_subscribers", &cleared)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_removed_event_reaches_all_subscribers() {
        let bus: InvalidationBus<String> = InvalidationBus::new();
        let seen = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            bus.on_item_removed(move |event| {
                assert_eq!(event.key, "k");
                assert_eq!(event.reason, RemovalReason::Expired);
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.emit_removed(&RemovedEvent {
            key: "k".to_string(),
            value: None,
            reason: RemovalReason::Expired,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_clear_all_carries_log_flag() {
        let bus: InvalidationBus<String> = InvalidationBus::new();
        let flagged = Arc::new(AtomicU32::new(0));
        let flagged_sub = Arc::clone(&flagged);
        bus.on_clear_all(move |log_to_fleet| {
            if log_to_fleet {
                flagged_sub.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.emit_clear_all(false);
        bus.emit_clear_all(true);
        assert_eq!(flagged.load(Ordering::SeqCst), 1);
    }
}
