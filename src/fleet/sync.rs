//! Fleet synchronization service
//!
//! Tracks fleet topology through an injected provider, gates participation
//! on the configured mode and the licensing cap, and fans invalidation
//! tasks out to every enabled, healthy peer. Delivery is fire-and-forget;
//! a peer that misses a task converges again from the authoritative
//! topology store on its own schedule.

use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use log::warn;

use crate::cache::clock::{Clock, SystemClock};
use crate::cache::types::{CacheOperationError, FleetStatistics, FleetStatisticsSnapshot};
use crate::fleet::config::{FleetConfig, FleetMode};
use crate::fleet::license::{self, LicenseValidator};
use crate::fleet::tasks::{
    InvalidationTask, OptimizeAction, TaskDescriptor, TaskRegistry, TaskTransport,
    register_builtin_kinds,
};
use crate::fleet::topology::{PeerServer, PeerTopologyProvider, TopologySnapshot};

/// Last delivered task per kind, for the optimization window
#[derive(Debug)]
struct RecentDelivery {
    payload: Vec<u8>,
    delivered_at_ns: u64,
}

/// Cross-node invalidation fan-out service
pub struct FleetSyncService {
    config: FleetConfig,
    topology: Arc<dyn PeerTopologyProvider>,
    transport: Arc<dyn TaskTransport>,
    licenses: Arc<dyn LicenseValidator>,
    registry: TaskRegistry,
    clock: Arc<dyn Clock>,
    snapshot: std::sync::RwLock<TopologySnapshot>,
    recent: DashMap<String, RecentDelivery>,
    stats: FleetStatistics,
}

impl FleetSyncService {
    /// Create a service on the system clock
    pub fn new(
        config: FleetConfig,
        topology: Arc<dyn PeerTopologyProvider>,
        transport: Arc<dyn TaskTransport>,
        licenses: Arc<dyn LicenseValidator>,
    ) -> Result<Self, CacheOperationError> {
        Self::with_clock(config, topology, transport, licenses, Arc::new(SystemClock))
    }

    /// Create a service on an injected clock
    pub fn with_clock(
        config: FleetConfig,
        topology: Arc<dyn PeerTopologyProvider>,
        transport: Arc<dyn TaskTransport>,
        licenses: Arc<dyn LicenseValidator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheOperationError> {
        config.validate()?;
        let registry = TaskRegistry::new();
        register_builtin_kinds(&registry);
        Ok(Self {
            config,
            topology,
            transport,
            licenses,
            registry,
            clock,
            snapshot: std::sync::RwLock::new(TopologySnapshot::default()),
            recent: DashMap::new(),
            stats: FleetStatistics::new(),
        })
    }

    /// Service configuration
    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Task kind registry
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Snapshot of the service's counters
    pub fn statistics(&self) -> FleetStatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Whether this node participates in fleet sync
    ///
    /// `Disabled` mode always opts out. Otherwise a node needs a server
    /// identity; hidden nodes are then enabled unconditionally, `Automatic`
    /// nodes are enabled by identity alone, and `Manual` nodes must appear
    /// in the persisted enabled-server list.
    pub fn enabled(&self) -> bool {
        if self.config.mode == FleetMode::Disabled {
            return false;
        }
        let Some(identity) = self.topology.current_server() else {
            return false;
        };
        if identity.hidden {
            return true;
        }
        match self.config.mode {
            FleetMode::Disabled => false,
            FleetMode::Automatic => true,
            FleetMode::Manual => self
                .topology
                .enabled_server_names()
                .iter()
                .any(|name| name == &identity.name),
        }
    }

    /// Enabled, healthy peers that should receive tasks; self excluded
    pub fn servers_to_update(&self) -> Vec<PeerServer> {
        let current_name = self
            .topology
            .current_server()
            .map(|identity| identity.name);
        self.fleet_servers()
            .into_iter()
            .filter(|server| server.is_reachable_target())
            .filter(|server| current_name.as_deref() != Some(server.name.as_str()))
            .collect()
    }

    /// Fleet servers counted against per-server licensing
    pub fn active_server_count(&self) -> usize {
        license::active_server_count(&self.fleet_servers(), self.licenses.as_ref())
    }

    /// Whether some valid license admits the current fleet size
    ///
    /// Cap `0` means unlimited. The result is advisory: the calling layer
    /// decides whether to degrade functionality, this service keeps
    /// operating either way.
    pub fn is_fleet_license_valid(&self, domain: &str) -> bool {
        let active = self.active_server_count();
        self.licenses
            .licenses_for(domain)
            .iter()
            .any(|license| license.admits(active))
    }

    /// Fan a task out to every peer that should receive it
    ///
    /// Returns `Ok(false)` without touching the transport when fleet sync
    /// is disabled or no peer qualifies. Returns `Ok(true)` once the task
    /// has been handed to the transport for every peer, or was dropped by
    /// the kind's optimization because an equivalent task just went out.
    /// Per-peer delivery failures are logged and counted, never retried.
    pub fn create_task(&self, task: InvalidationTask) -> Result<bool, CacheOperationError> {
        let descriptor = self
            .registry
            .descriptor_for(&task.kind)
            .ok_or_else(|| CacheOperationError::UnknownTaskKind(task.kind.clone()))?;

        if !self.enabled() {
            return Ok(false);
        }
        let peers = self.servers_to_update();
        if peers.is_empty() {
            return Ok(false);
        }

        if self.optimized_away(&descriptor, &task) {
            self.stats.tasks_optimized_away.fetch_add(1, Ordering::Relaxed);
            return Ok(true);
        }

        self.stats.tasks_created.fetch_add(1, Ordering::Relaxed);
        for peer in &peers {
            match self.transport.deliver(peer, &task) {
                Ok(()) => {
                    self.stats.tasks_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(delivery_error) => {
                    warn!(
                        "task {} ({}) not delivered to {}: {}",
                        task.id, task.kind, peer.name, delivery_error
                    );
                    self.stats.delivery_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(true)
    }

    /// Whether the kind's optimization drops this task
    ///
    /// `Deduplicate` drops a task identical to the last one of its kind
    /// within the window; `Coalesce` drops any same-kind task within the
    /// window. Either way the window entry is refreshed when the task goes
    /// through.
    fn optimized_away(&self, descriptor: &TaskDescriptor, task: &InvalidationTask) -> bool {
        if descriptor.optimization == OptimizeAction::None {
            return false;
        }
        let now_ns = self.clock.now_ns();
        let window_ns = self.config.sync_interval_ms.saturating_mul(1_000_000);
        let mut dropped = false;
        self.recent
            .entry(task.kind.clone())
            .and_modify(|recent| {
                let fresh = now_ns.saturating_sub(recent.delivered_at_ns) < window_ns;
                let redundant = match descriptor.optimization {
                    OptimizeAction::Coalesce => true,
                    _ => recent.payload == task.payload,
                };
                if fresh && redundant {
                    dropped = true;
                } else {
                    recent.payload = task.payload.clone();
                    recent.delivered_at_ns = now_ns;
                }
            })
            .or_insert_with(|| RecentDelivery {
                payload: task.payload.clone(),
                delivered_at_ns: now_ns,
            });
        dropped
    }

    /// Cached fleet server list, refreshed once per sync interval
    fn fleet_servers(&self) -> Vec<PeerServer> {
        let now_ns = self.clock.now_ns();
        let window_ns = self.config.sync_interval_ms.saturating_mul(1_000_000);

        {
            let snapshot = self.read_snapshot();
            if let Some(refreshed_at_ns) = snapshot.refreshed_at_ns {
                if now_ns.saturating_sub(refreshed_at_ns) < window_ns {
                    return snapshot.servers.clone();
                }
            }
        }

        let mut snapshot = self.write_snapshot();
        // Another reader may have refreshed while we waited for the lock.
        if let Some(refreshed_at_ns) = snapshot.refreshed_at_ns {
            if now_ns.saturating_sub(refreshed_at_ns) < window_ns {
                return snapshot.servers.clone();
            }
        }
        snapshot.servers = self.topology.all_servers();
        snapshot.refreshed_at_ns = Some(now_ns);
        snapshot.generation += 1;
        snapshot.servers.clone()
    }

    fn read_snapshot(&self) -> RwLockReadGuard<'_, TopologySnapshot> {
        match self.snapshot.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_snapshot(&self) -> RwLockWriteGuard<'_, TopologySnapshot> {
        match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for FleetSyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetSyncService")
            .field("config", &self.config)
            .field("registered_kinds", &self.registry.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::fleet::license::License;
    use crate::fleet::tasks::{ClearCachePayload, RemoveCacheItemPayload, kinds};
    use crate::fleet::topology::{ServerHealth, ServerIdentity};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    struct StaticTopology {
        current: Option<ServerIdentity>,
        servers: Vec<PeerServer>,
        enabled_names: Vec<String>,
        fetches: AtomicU32,
    }

    impl PeerTopologyProvider for StaticTopology {
        fn current_server(&self) -> Option<ServerIdentity> {
            self.current.clone()
        }

        fn all_servers(&self) -> Vec<PeerServer> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.servers.clone()
        }

        fn enabled_server_names(&self) -> Vec<String> {
            self.enabled_names.clone()
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        deliveries: Mutex<Vec<(String, String)>>,
    }

    impl TaskTransport for RecordingTransport {
        fn deliver(
            &self,
            target: &PeerServer,
            task: &InvalidationTask,
        ) -> Result<(), CacheOperationError> {
            self.deliveries
                .lock()
                .expect("transport lock")
                .push((target.name.clone(), task.kind.clone()));
            Ok(())
        }
    }

    struct NoLicenses;

    impl LicenseValidator for NoLicenses {
        fn licenses_for(&self, _domain: &str) -> Vec<License> {
            Vec::new()
        }
    }

    struct StaticLicenses(Vec<License>);

    impl LicenseValidator for StaticLicenses {
        fn licenses_for(&self, domain: &str) -> Vec<License> {
            self.0
                .iter()
                .filter(|license| license.domain == domain)
                .cloned()
                .collect()
        }
    }

    fn server(name: &str) -> PeerServer {
        PeerServer {
            name: name.to_string(),
            enabled: true,
            health: ServerHealth::Healthy,
            is_external_web_app: false,
            bound_domain: None,
        }
    }

    fn service(
        mode: FleetMode,
        topology: StaticTopology,
        transport: Arc<RecordingTransport>,
    ) -> (FleetSyncService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = FleetConfig {
            mode,
            ..FleetConfig::default()
        };
        let service = FleetSyncService::with_clock(
            config,
            Arc::new(topology),
            transport,
            Arc::new(NoLicenses),
            clock.clone(),
        )
        .expect("valid config");
        (service, clock)
    }

    fn remove_item_task(key: &str) -> InvalidationTask {
        InvalidationTask::new(
            kinds::REMOVE_CACHE_ITEM,
            &RemoveCacheItemPayload {
                key: key.to_string(),
            },
        )
        .expect("payload encodes")
    }

    #[test]
    fn test_disabled_mode_creates_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "A".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B")],
            enabled_names: vec![],
            fetches: AtomicU32::new(0),
        };
        let (service, _clock) = service(FleetMode::Disabled, topology, Arc::clone(&transport));

        assert!(!service.enabled());
        let created = service
            .create_task(remove_item_task("k"))
            .expect("known kind");
        assert!(!created);
        assert!(transport.deliveries.lock().expect("lock").is_empty());
    }

    #[test]
    fn test_automatic_mode_delivers_to_peers_excluding_self() {
        let transport = Arc::new(RecordingTransport::default());
        let mut unresponsive = server("C");
        unresponsive.health = ServerHealth::Unresponsive;
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "A".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B"), unresponsive],
            enabled_names: vec![],
            fetches: AtomicU32::new(0),
        };
        let (service, _clock) = service(FleetMode::Automatic, topology, Arc::clone(&transport));

        assert!(service.enabled());
        let created = service
            .create_task(remove_item_task("k"))
            .expect("known kind");
        assert!(created);

        let deliveries = transport.deliveries.lock().expect("lock");
        assert_eq!(
            *deliveries,
            vec![("B".to_string(), kinds::REMOVE_CACHE_ITEM.to_string())]
        );
    }

    #[test]
    fn test_manual_mode_scenario() {
        // Enabled list ["A", "B"], current node "A": enabled, peers == ["B"].
        let transport = Arc::new(RecordingTransport::default());
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "A".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B")],
            enabled_names: vec!["A".to_string(), "B".to_string()],
            fetches: AtomicU32::new(0),
        };
        let (service, _clock) = service(FleetMode::Manual, topology, Arc::clone(&transport));

        assert!(service.enabled());
        let peers: Vec<String> = service
            .servers_to_update()
            .into_iter()
            .map(|peer| peer.name)
            .collect();
        assert_eq!(peers, vec!["B".to_string()]);

        let task = InvalidationTask::new(kinds::CLEAR_CACHE, &ClearCachePayload)
            .expect("payload encodes");
        assert!(service.create_task(task).expect("known kind"));
        let deliveries = transport.deliveries.lock().expect("lock");
        assert_eq!(
            *deliveries,
            vec![("B".to_string(), kinds::CLEAR_CACHE.to_string())]
        );
    }

    #[test]
    fn test_manual_mode_unlisted_node_is_disabled_unless_hidden() {
        let transport = Arc::new(RecordingTransport::default());
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "C".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B"), server("C")],
            enabled_names: vec!["A".to_string(), "B".to_string()],
            fetches: AtomicU32::new(0),
        };
        let (unlisted, _clock) = service(FleetMode::Manual, topology, Arc::clone(&transport));
        assert!(!unlisted.enabled());

        let hidden_topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "C".to_string(),
                hidden: true,
            }),
            servers: vec![server("A"), server("B"), server("C")],
            enabled_names: vec!["A".to_string(), "B".to_string()],
            fetches: AtomicU32::new(0),
        };
        let (hidden, _clock) = service(FleetMode::Manual, hidden_topology, transport);
        assert!(hidden.enabled());
    }

    #[test]
    fn test_unknown_kind_is_an_error() {
        let transport = Arc::new(RecordingTransport::default());
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "A".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B")],
            enabled_names: vec![],
            fetches: AtomicU32::new(0),
        };
        let (service, _clock) = service(FleetMode::Automatic, topology, transport);

        let task = InvalidationTask {
            id: uuid::Uuid::new_v4(),
            kind: "never-registered".to_string(),
            payload: Vec::new(),
        };
        assert!(matches!(
            service.create_task(task),
            Err(CacheOperationError::UnknownTaskKind(_))
        ));
    }

    #[test]
    fn test_deduplicate_drops_identical_task_within_window() {
        let transport = Arc::new(RecordingTransport::default());
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "A".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B")],
            enabled_names: vec![],
            fetches: AtomicU32::new(0),
        };
        let (service, clock) = service(FleetMode::Automatic, topology, Arc::clone(&transport));

        assert!(service.create_task(remove_item_task("k")).expect("ok"));
        assert!(service.create_task(remove_item_task("k")).expect("ok"));
        // Different payload is not a duplicate.
        assert!(service.create_task(remove_item_task("other")).expect("ok"));
        assert_eq!(transport.deliveries.lock().expect("lock").len(), 2);
        assert_eq!(service.statistics().tasks_optimized_away, 1);

        // Past the window the same task is delivered again.
        clock.advance_ms(1_001);
        assert!(service.create_task(remove_item_task("other")).expect("ok"));
        assert_eq!(transport.deliveries.lock().expect("lock").len(), 3);
    }

    #[test]
    fn test_topology_snapshot_is_cached_for_the_sync_interval() {
        let transport = Arc::new(RecordingTransport::default());
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "A".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B")],
            enabled_names: vec![],
            fetches: AtomicU32::new(0),
        };
        let (service, clock) = service(FleetMode::Automatic, topology, transport);

        service.servers_to_update();
        service.servers_to_update();
        service.servers_to_update();
        assert_eq!(service.read_snapshot().generation, 1);

        clock.advance_ms(1_001);
        service.servers_to_update();

        // One fetch at first use, one after the interval elapsed.
        assert_eq!(service.read_snapshot().generation, 2);
    }

    #[test]
    fn test_license_gate() {
        let topology = StaticTopology {
            current: Some(ServerIdentity {
                name: "A".to_string(),
                hidden: false,
            }),
            servers: vec![server("A"), server("B"), server("C")],
            enabled_names: vec![],
            fetches: AtomicU32::new(0),
        };
        let licenses = StaticLicenses(vec![
            License {
                domain: "small.example.com".to_string(),
                covers_fleet_sync: true,
                server_cap: 2,
                valid: true,
            },
            License {
                domain: "big.example.com".to_string(),
                covers_fleet_sync: true,
                server_cap: 0,
                valid: true,
            },
        ]);
        let service = FleetSyncService::with_clock(
            FleetConfig {
                mode: FleetMode::Automatic,
                ..FleetConfig::default()
            },
            Arc::new(topology),
            Arc::new(RecordingTransport::default()),
            Arc::new(licenses),
            Arc::new(ManualClock::new()),
        )
        .expect("valid config");

        assert_eq!(service.active_server_count(), 3);
        assert!(!service.is_fleet_license_valid("small.example.com"));
        assert!(service.is_fleet_license_valid("big.example.com"));
        assert!(!service.is_fleet_license_valid("unlicensed.example.com"));
    }
}
