//! Cache engine configuration
//!
//! Serde-backed configuration for the engine and its maintenance worker.
//! Values are validated up front; an out-of-range value is a configuration
//! error, never a silent clamp.

use serde::{Deserialize, Serialize};

use crate::cache::types::CacheOperationError;

/// Configuration for a [`CacheEngine`](crate::cache::engine::CacheEngine)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Global switch for progressive caching; per-call settings cannot
    /// re-enable it once this is off
    pub allow_progressive_caching: bool,
    /// Store values behind weak references so unreferenced entries can be
    /// reclaimed between sweeps
    pub weak_values: bool,
    /// Maintenance sweep period in milliseconds
    pub sweep_interval_ms: u64,
    /// Entry count above which the underused sweep starts evicting
    pub soft_entry_limit: usize,
    /// Idle window after which an untouched entry counts as underused, in
    /// milliseconds
    pub underused_idle_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            allow_progressive_caching: true,
            weak_values: false,
            sweep_interval_ms: 1_000,
            soft_entry_limit: 100_000,
            underused_idle_ms: 10 * 60 * 1_000,
        }
    }
}

impl CacheConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CacheOperationError> {
        if self.sweep_interval_ms == 0 {
            return Err(CacheOperationError::configuration_error(
                "sweep_interval_ms must be greater than zero",
            ));
        }
        if self.soft_entry_limit == 0 {
            return Err(CacheOperationError::configuration_error(
                "soft_entry_limit must be greater than zero",
            ));
        }
        if self.underused_idle_ms == 0 {
            return Err(CacheOperationError::configuration_error(
                "underused_idle_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let config = CacheConfig {
            sweep_interval_ms: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheOperationError::ConfigurationError(_))
        ));
    }
}
