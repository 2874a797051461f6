//! Process-local caching engine
//!
//! Concurrent store, single-flight load protocol, expiration and
//! dependency-based invalidation, with synchronous event fan-out for the
//! fleet layer to observe.

pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod singleflight;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use engine::{CacheEngine, CacheSettings, item_name_from_parts};
pub use events::{InvalidationBus, RemovedEvent};
pub use store::ConcurrentStore;
pub use types::{
    CacheOperationError, CachePriority, CacheStatisticsSnapshot, CachedValue, RemovalReason,
};
