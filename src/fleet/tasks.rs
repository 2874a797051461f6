//! Fleet task model and registry
//!
//! An [`InvalidationTask`] carries one cache-maintenance signal to every
//! peer: a bincode-encoded payload under a registered task kind. Kinds are
//! registered up front with their delivery semantics; creating a task of an
//! unregistered kind is an error, never a silent drop.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::types::CacheOperationError;
use crate::fleet::topology::PeerServer;

/// Redundant-task elimination applied within the optimization window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizeAction {
    /// Every task is delivered
    #[default]
    None,
    /// A task identical (kind and payload) to one just delivered is dropped
    Deduplicate,
    /// Only one task per kind is delivered per window, newest first
    Coalesce,
}

/// Registered delivery semantics for one task kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique kind identifier
    pub kind: String,
    /// Memory-only tasks need not survive a peer's process restart
    pub is_memory_only: bool,
    /// Redundancy elimination mode
    pub optimization: OptimizeAction,
}

/// Registry of known task kinds
#[derive(Debug, Default)]
pub struct TaskRegistry {
    kinds: DashMap<String, TaskDescriptor>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task kind, replacing any previous registration
    pub fn register(&self, descriptor: TaskDescriptor) {
        self.kinds.insert(descriptor.kind.clone(), descriptor);
    }

    /// Descriptor for a kind, if registered
    pub fn descriptor_for(&self, kind: &str) -> Option<TaskDescriptor> {
        self.kinds.get(kind).map(|entry| entry.value().clone())
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// One cache-maintenance signal bound for the fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationTask {
    /// Task identity, for logging and delivery bookkeeping
    pub id: Uuid,
    /// Registered kind
    pub kind: String,
    /// Bincode-encoded payload
    pub payload: Vec<u8>,
}

impl InvalidationTask {
    /// Build a task, encoding the payload
    pub fn new<P: bincode::Encode>(
        kind: impl Into<String>,
        payload: &P,
    ) -> Result<Self, CacheOperationError> {
        let payload = bincode::encode_to_vec(payload, bincode::config::standard())
            .map_err(|encode_error| {
                CacheOperationError::serialization_failed(encode_error.to_string())
            })?;
        Ok(Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
        })
    }

    /// Decode the payload back into its typed form
    pub fn decode_payload<P: bincode::Decode<()>>(&self) -> Result<P, CacheOperationError> {
        bincode::decode_from_slice(&self.payload, bincode::config::standard())
            .map(|(payload, _)| payload)
            .map_err(|decode_error| {
                CacheOperationError::serialization_failed(decode_error.to_string())
            })
    }
}

/// Transport boundary delivering tasks to peers
///
/// Delivery is fire-and-forget: no acknowledgement and no ordering
/// guarantee across peers. The transport is assumed idempotent; this crate
/// never retries a failed delivery.
pub trait TaskTransport: Send + Sync {
    fn deliver(&self, target: &PeerServer, task: &InvalidationTask)
    -> Result<(), CacheOperationError>;
}

/// Built-in task kinds for cache maintenance
pub mod kinds {
    /// Remove one cache item (and its dependents) on every peer
    pub const REMOVE_CACHE_ITEM: &str = "cache.remove-item";
    /// Remove every cache item under a key prefix on every peer
    pub const REMOVE_CACHE_PREFIX: &str = "cache.remove-prefix";
    /// Clear the whole cache on every peer
    pub const CLEAR_CACHE: &str = "cache.clear";
}

/// Payload of [`kinds::REMOVE_CACHE_ITEM`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct RemoveCacheItemPayload {
    pub key: String,
}

/// Payload of [`kinds::REMOVE_CACHE_PREFIX`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct RemoveCachePrefixPayload {
    pub prefix: String,
}

/// Payload of [`kinds::CLEAR_CACHE`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ClearCachePayload;

/// Register the built-in cache-maintenance kinds
pub fn register_builtin_kinds(registry: &TaskRegistry) {
    registry.register(TaskDescriptor {
        kind: kinds::REMOVE_CACHE_ITEM.to_string(),
        is_memory_only: true,
        optimization: OptimizeAction::Deduplicate,
    });
    registry.register(TaskDescriptor {
        kind: kinds::REMOVE_CACHE_PREFIX.to_string(),
        is_memory_only: true,
        optimization: OptimizeAction::Deduplicate,
    });
    registry.register(TaskDescriptor {
        kind: kinds::CLEAR_CACHE.to_string(),
        is_memory_only: true,
        optimization: OptimizeAction::Coalesce,
    });
}
