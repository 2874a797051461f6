//! Fleet synchronization configuration
//!
//! Mirrors the externally persisted settings surface: the fleet mode (stored
//! as a numeric value), the topology refresh interval, and the file
//! synchronization toggles.

use serde::{Deserialize, Serialize};

use crate::cache::types::CacheOperationError;

/// Fleet participation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FleetMode {
    /// Node never participates in fleet sync
    #[default]
    Disabled,
    /// Node participates whenever it has a server identity
    Automatic,
    /// Node participates only if listed in the enabled-server list
    Manual,
}

impl FleetMode {
    /// Map the persisted numeric setting to a mode
    ///
    /// Unknown values disable fleet sync rather than failing startup.
    pub fn from_config_value(value: i64) -> Self {
        match value {
            1 => Self::Automatic,
            2 => Self::Manual,
            0 => Self::Disabled,
            other => {
                log::warn!("unknown fleet mode {}, fleet sync disabled", other);
                Self::Disabled
            }
        }
    }
}

/// Configuration for the [`FleetSyncService`](crate::fleet::FleetSyncService)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Participation mode
    pub mode: FleetMode,
    /// Topology cache lifetime and task optimization window, in milliseconds
    pub sync_interval_ms: u64,
    /// Largest file the physical-file synchronization will ship, in bytes
    pub max_sync_file_size: u64,
    /// Whether physical file changes are synchronized across the fleet
    pub synchronize_physical_files: bool,
    /// Whether file deletions are synchronized across the fleet
    pub synchronize_deleted_files: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            mode: FleetMode::Disabled,
            sync_interval_ms: 1_000,
            max_sync_file_size: 4 * 1024 * 1024,
            synchronize_physical_files: true,
            synchronize_deleted_files: true,
        }
    }
}

impl FleetConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CacheOperationError> {
        if self.sync_interval_ms == 0 {
            return Err(CacheOperationError::configuration_error(
                "sync_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_mapping() {
        assert_eq!(FleetMode::from_config_value(0), FleetMode::Disabled);
        assert_eq!(FleetMode::from_config_value(1), FleetMode::Automatic);
        assert_eq!(FleetMode::from_config_value(2), FleetMode::Manual);
        assert_eq!(FleetMode::from_config_value(99), FleetMode::Disabled);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(FleetConfig::default().validate().is_ok());
        assert_eq!(FleetConfig::default().sync_interval_ms, 1_000);
    }
}
