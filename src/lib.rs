//! Fleetcache - progressive caching with cross-node invalidation
//!
//! A process-local key/value cache built for server fleets: a logically
//! shared cache stays eventually consistent while every node keeps its own
//! memory-resident store.
//!
//! # Features
//!
//! - **Single-flight loads**: at most one concurrent computation per key;
//!   concurrent demand shares the in-flight result
//! - **Progressive caching**: computations are shared across callers even
//!   when the result is deliberately not persisted
//! - **Absolute and sliding expiration**: exactly one per entry, swept by a
//!   background maintenance worker
//! - **Priority and dependency eviction**: `NotRemovable` pinning,
//!   transitive dependency cascades, prefix invalidation
//! - **Weak-reference storage**: optionally let unreferenced values be
//!   reclaimed between sweeps
//! - **Fleet sync**: invalidation tasks fan out to enabled, healthy peers,
//!   gated by topology mode and per-server licensing
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetcache::prelude::*;
//!
//! let engine: CacheEngine<String> = CacheEngine::new(CacheConfig::default())?;
//! let settings = CacheSettings::builder(10.0)
//!     .name_parts(["node", "42"])
//!     .dependencies(["node|all"])
//!     .build()?;
//! let value = engine.get_or_compute(settings, || Ok(Some(load_node_42()?)))?;
//! ```

pub mod cache;
pub mod fleet;
pub mod prelude;

pub use cache::engine::{CacheEngine, CacheSettings};
pub use cache::types::{CacheOperationError, CachePriority, CachedValue, RemovalReason};
pub use cache::{CacheConfig, ConcurrentStore, InvalidationBus};
pub use fleet::{FleetConfig, FleetMode, FleetSyncService, InvalidationTask};
