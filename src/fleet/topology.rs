//! Fleet topology model
//!
//! Peer servers are read from an external topology store through the
//! [`PeerTopologyProvider`] seam and cached as a snapshot for the sync
//! interval. The current node never appears in its own peer list.

use serde::{Deserialize, Serialize};

/// Reachability of a peer as last reported by the topology store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerHealth {
    Healthy,
    Unresponsive,
}

/// One server in the fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerServer {
    /// Unique server name within the fleet
    pub name: String,
    /// Whether the server is administratively enabled
    pub enabled: bool,
    /// Last known reachability
    pub health: ServerHealth,
    /// External web applications can be exempt from per-server licensing
    /// when their bound domain carries its own valid license
    pub is_external_web_app: bool,
    /// Domain the server is bound to, when known
    pub bound_domain: Option<String>,
}

impl PeerServer {
    /// Whether this server should receive fleet tasks
    #[inline(always)]
    pub fn is_reachable_target(&self) -> bool {
        self.enabled && self.health == ServerHealth::Healthy
    }
}

/// Identity of the node this process runs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// This node's server name
    pub name: String,
    /// Hidden nodes participate in fleet sync regardless of mode
    pub hidden: bool,
}

/// External topology store boundary
///
/// Implementations read the authoritative server list and this node's
/// identity; the sync service caches the results for the sync interval.
pub trait PeerTopologyProvider: Send + Sync {
    /// This node's identity, if it has been registered
    fn current_server(&self) -> Option<ServerIdentity>;

    /// Every server in the fleet, the current node included
    fn all_servers(&self) -> Vec<PeerServer>;

    /// The persisted enabled-server list consulted in `Manual` mode
    fn enabled_server_names(&self) -> Vec<String>;
}

/// Cached view of the fleet, refreshed at the sync interval
#[derive(Debug, Default)]
pub(crate) struct TopologySnapshot {
    pub servers: Vec<PeerServer>,
    /// Stamp of the last refresh; `None` forces the first read to refresh
    pub refreshed_at_ns: Option<u64>,
    /// Bumped on every refresh so readers can detect turnover
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_target_requires_enabled_and_healthy() {
        let mut server = PeerServer {
            name: "b".to_string(),
            enabled: true,
            health: ServerHealth::Healthy,
            is_external_web_app: false,
            bound_domain: None,
        };
        assert!(server.is_reachable_target());

        server.health = ServerHealth::Unresponsive;
        assert!(!server.is_reachable_target());

        server.health = ServerHealth::Healthy;
        server.enabled = false;
        assert!(!server.is_reachable_target());
    }
}
