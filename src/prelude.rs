//! Fleetcache prelude - convenient imports for users
//!
//! Everything needed for the common paths: engine construction, per-call
//! settings, and the fleet seams.

pub use crate::cache::clock::{Clock, ManualClock, SystemClock};
pub use crate::cache::config::CacheConfig;
pub use crate::cache::engine::{CacheEngine, CacheSettings, item_name_from_parts};
pub use crate::cache::events::RemovedEvent;
pub use crate::cache::types::{
    CacheOperationError, CachePriority, CacheStatisticsSnapshot, CachedValue, RemovalReason,
};
pub use crate::fleet::{
    FleetConfig, FleetMode, FleetSyncService, InvalidationTask, License, LicenseValidator,
    PeerServer, PeerTopologyProvider, ServerHealth, ServerIdentity, TaskTransport,
    apply_task, connect_engine, without_fleet_logging,
};
