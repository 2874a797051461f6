//! Fleet licensing gate
//!
//! The licensing validator is an external boundary; this module only
//! computes whether the fleet's active server count fits under some valid
//! license's cap. A violation is reported as a boolean; the calling layer
//! decides whether to degrade or surface an error, the cache core never
//! does either.

use crate::fleet::topology::PeerServer;

/// One license as reported by the external validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    /// Domain the license is issued for
    pub domain: String,
    /// Whether the license covers the fleet-sync feature at all
    pub covers_fleet_sync: bool,
    /// Maximum licensed servers; `0` means unlimited
    pub server_cap: u32,
    /// Whether the license is currently valid
    pub valid: bool,
}

impl License {
    /// Whether this license admits a fleet of `active_servers` nodes
    pub fn admits(&self, active_servers: usize) -> bool {
        self.valid
            && self.covers_fleet_sync
            && (self.server_cap == 0 || self.server_cap as usize >= active_servers)
    }
}

/// External licensing validator boundary
pub trait LicenseValidator: Send + Sync {
    /// Licenses issued for the given domain
    fn licenses_for(&self, domain: &str) -> Vec<License>;
}

/// Servers counted against per-server licensing
///
/// Healthy, enabled servers count; external web applications whose bound
/// domain carries its own valid fleet license are exempt.
pub fn active_server_count(servers: &[PeerServer], validator: &dyn LicenseValidator) -> usize {
    let counted = servers
        .iter()
        .filter(|server| server.is_reachable_target())
        .count();
    let exempt = servers
        .iter()
        .filter(|server| {
            server.is_reachable_target()
                && server.is_external_web_app
                && server.bound_domain.as_deref().is_some_and(|domain| {
                    validator
                        .licenses_for(domain)
                        .iter()
                        .any(|license| license.valid && license.covers_fleet_sync)
                })
        })
        .count();
    counted.saturating_sub(exempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::topology::ServerHealth;

    struct StaticValidator(Vec<License>);

    impl LicenseValidator for StaticValidator {
        fn licenses_for(&self, domain: &str) -> Vec<License> {
            self.0
                .iter()
                .filter(|license| license.domain == domain)
                .cloned()
                .collect()
        }
    }

    fn server(name: &str, external: bool, domain: Option<&str>) -> PeerServer {
        PeerServer {
            name: name.to_string(),
            enabled: true,
            health: ServerHealth::Healthy,
            is_external_web_app: external,
            bound_domain: domain.map(str::to_string),
        }
    }

    #[test]
    fn test_cap_zero_is_unlimited() {
        let license = License {
            domain: "example.com".to_string(),
            covers_fleet_sync: true,
            server_cap: 0,
            valid: true,
        };
        assert!(license.admits(10_000));
    }

    #[test]
    fn test_invalid_or_uncovering_license_admits_nothing() {
        let mut license = License {
            domain: "example.com".to_string(),
            covers_fleet_sync: true,
            server_cap: 10,
            valid: false,
        };
        assert!(!license.admits(1));

        license.valid = true;
        license.covers_fleet_sync = false;
        assert!(!license.admits(1));
    }

    #[test]
    fn test_external_web_app_allowance() {
        let validator = StaticValidator(vec![License {
            domain: "shop.example.com".to_string(),
            covers_fleet_sync: true,
            server_cap: 0,
            valid: true,
        }]);
        let servers = vec![
            server("a", false, None),
            server("b", false, None),
            // Separately licensed external web app does not count.
            server("shop", true, Some("shop.example.com")),
            // External web app without its own license still counts.
            server("blog", true, Some("blog.example.com")),
        ];
        assert_eq!(active_server_count(&servers, &validator), 3);
    }

    #[test]
    fn test_unhealthy_servers_are_not_counted() {
        let validator = StaticValidator(Vec::new());
        let mut unhealthy = server("down", false, None);
        unhealthy.health = ServerHealth::Unresponsive;
        let servers = vec![server("up", false, None), unhealthy];
        assert_eq!(active_server_count(&servers, &validator), 1);
    }
}
