//! Cross-node cache invalidation
//!
//! Topology tracking, licensing gate, task registry and the sync service
//! that fans invalidation tasks out to peers, plus the bridge wiring a
//! local [`CacheEngine`](crate::cache::CacheEngine)'s invalidation events
//! into fleet tasks, and the applier for tasks arriving from peers.

pub mod config;
pub mod license;
pub mod sync;
pub mod tasks;
pub mod topology;

pub use config::{FleetConfig, FleetMode};
pub use license::{License, LicenseValidator};
pub use sync::FleetSyncService;
pub use tasks::{
    InvalidationTask, OptimizeAction, TaskDescriptor, TaskRegistry, TaskTransport, kinds,
};
pub use topology::{PeerServer, PeerTopologyProvider, ServerHealth, ServerIdentity};

use std::cell::Cell;
use std::sync::Arc;

use log::warn;

use crate::cache::engine::CacheEngine;
use crate::cache::types::{CacheOperationError, RemovalReason};
use crate::fleet::tasks::{ClearCachePayload, RemoveCacheItemPayload};

thread_local! {
    /// Suppresses fleet logging while a remote task is applied locally
    static FLEET_LOGGING_SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Run `operation` without upgrading its invalidations into fleet tasks
///
/// The invalidation bus fans out synchronously on the calling thread, so a
/// thread-local flag is enough to keep a remotely triggered removal from
/// echoing back into the fleet.
pub fn without_fleet_logging<R>(operation: impl FnOnce() -> R) -> R {
    struct Restore(bool);
    impl Drop for Restore {
        fn drop(&mut self) {
            FLEET_LOGGING_SUPPRESSED.with(|flag| flag.set(self.0));
        }
    }
    let _restore = Restore(FLEET_LOGGING_SUPPRESSED.with(|flag| flag.replace(true)));
    operation()
}

fn fleet_logging_suppressed() -> bool {
    FLEET_LOGGING_SUPPRESSED.with(|flag| flag.get())
}

/// Wire a local engine's invalidation events into fleet tasks
///
/// Explicit removals become remove-item tasks; clear-all events with the
/// log flag set become clear-cache tasks. Expiration, underused eviction
/// and dependency cascades stay local: every peer sweeps and cascades on
/// its own.
pub fn connect_engine<V: Send + Sync + 'static>(
    engine: &CacheEngine<V>,
    fleet: Arc<FleetSyncService>,
) {
    let removal_fleet = Arc::clone(&fleet);
    engine.bus().on_item_removed(move |event| {
        if event.reason != RemovalReason::Removed || fleet_logging_suppressed() {
            return;
        }
        let task = InvalidationTask::new(
            kinds::REMOVE_CACHE_ITEM,
            &RemoveCacheItemPayload {
                key: event.key.clone(),
            },
        );
        match task.and_then(|task| removal_fleet.create_task(task)) {
            Ok(_) => {}
            Err(task_error) => {
                warn!("removal of '{}' not propagated to fleet: {}", event.key, task_error);
            }
        }
    });

    engine.bus().on_clear_all(move |log_to_fleet| {
        if !log_to_fleet || fleet_logging_suppressed() {
            return;
        }
        let task = InvalidationTask::new(kinds::CLEAR_CACHE, &ClearCachePayload);
        match task.and_then(|task| fleet.create_task(task)) {
            Ok(_) => {}
            Err(task_error) => {
                warn!("cache clear not propagated to fleet: {}", task_error);
            }
        }
    });
}

/// Apply a task received from a peer to the local engine
///
/// Runs under [`without_fleet_logging`] so the local removal does not
/// bounce back into the fleet.
pub fn apply_task<V: Send + Sync + 'static>(
    engine: &CacheEngine<V>,
    task: &InvalidationTask,
) -> Result<(), CacheOperationError> {
    match task.kind.as_str() {
        kinds::REMOVE_CACHE_ITEM => {
            let payload: RemoveCacheItemPayload = task.decode_payload()?;
            without_fleet_logging(|| engine.remove(&payload.key));
            Ok(())
        }
        kinds::REMOVE_CACHE_PREFIX => {
            let payload: tasks::RemoveCachePrefixPayload = task.decode_payload()?;
            without_fleet_logging(|| engine.remove_by_prefix(&payload.prefix));
            Ok(())
        }
        kinds::CLEAR_CACHE => {
            task.decode_payload::<ClearCachePayload>()?;
            without_fleet_logging(|| engine.clear(false));
            Ok(())
        }
        other => Err(CacheOperationError::UnknownTaskKind(other.to_string())),
    }
}
