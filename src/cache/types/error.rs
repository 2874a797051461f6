//! Cache operation error handling
//!
//! Error taxonomy for store, single-flight, engine and fleet operations.
//! Nothing in this crate escalates an error into a panic; the worst case on
//! total failure is behaving as if caching or fleet sync were disabled.

/// Error type shared by all cache and fleet operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOperationError {
    /// Key not present in the store
    KeyNotFound,
    /// Operation is not supported in the store's current mode
    UnsupportedOperation(String),
    /// Loader produced no result for an in-flight computation
    LoadFailed(String),
    /// Internal state machine observed an impossible transition
    InvalidState(String),
    /// Configuration value out of range or inconsistent
    ConfigurationError(String),
    /// Task payload could not be encoded or decoded
    SerializationError(String),
    /// Task kind was never registered with the task registry
    UnknownTaskKind(String),
    /// Delivery to a peer node failed
    DeliveryFailed(String),
    /// Fleet size exceeds every valid license's server cap
    LicenseLimitExceeded,
}

impl std::fmt::Display for CacheOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheOperationError::KeyNotFound => write!(f, "Key not found in cache"),
            CacheOperationError::UnsupportedOperation(msg) => {
                write!(f, "Unsupported operation: {}", msg)
            }
            CacheOperationError::LoadFailed(msg) => write!(f, "Cache load failed: {}", msg),
            CacheOperationError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CacheOperationError::ConfigurationError(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            CacheOperationError::SerializationError(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            CacheOperationError::UnknownTaskKind(kind) => {
                write!(f, "Unknown fleet task kind: {}", kind)
            }
            CacheOperationError::DeliveryFailed(msg) => {
                write!(f, "Fleet task delivery failed: {}", msg)
            }
            CacheOperationError::LicenseLimitExceeded => {
                write!(f, "Fleet size exceeds licensed server count")
            }
        }
    }
}

impl std::error::Error for CacheOperationError {}

impl CacheOperationError {
    /// Create an unsupported-operation error
    #[inline(always)]
    pub fn unsupported_operation(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Create a load-failure error
    #[inline(always)]
    pub fn load_failed(msg: impl Into<String>) -> Self {
        Self::LoadFailed(msg.into())
    }

    /// Create an invalid-state error
    #[inline(always)]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a configuration error
    #[inline(always)]
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Create a serialization error
    #[inline(always)]
    pub fn serialization_failed(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a delivery-failure error
    #[inline(always)]
    pub fn delivery_failed(msg: impl Into<String>) -> Self {
        Self::DeliveryFailed(msg.into())
    }

    /// Whether retrying the failed operation can succeed without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LoadFailed(_) | Self::DeliveryFailed(_) | Self::KeyNotFound
        )
    }
}
