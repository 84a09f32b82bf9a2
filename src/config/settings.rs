// Configuration structs
//
// Every timeout is configurable. Values are stored in milliseconds so the
// TOML stays readable (`cached_timeout_ms = 1500`), and exposed as
// `Duration` through accessor methods.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::constants::*;
use crate::discovery::DiscoveryTier;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tier ladder settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Health monitor cadence and probe timeout
    #[serde(default)]
    pub health: HealthConfig,

    /// Capability prober endpoints and timeouts
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Where the server list is persisted (defaults to ~/.lanlink/servers.json)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

/// Discovery tier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Reconnect attempt against the last known server. Kept tight: it is
    /// only a latency shortcut.
    #[serde(default = "default_cached_timeout_ms")]
    pub cached_timeout_ms: u64,

    #[serde(default = "default_advertisement_timeout_ms")]
    pub advertisement_timeout_ms: u64,

    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,

    /// Whole-subnet enumeration, so the loosest budget.
    #[serde(default = "default_subnet_timeout_ms")]
    pub subnet_timeout_ms: u64,

    /// mDNS service type to browse for
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// UDP port of the peer beacon
    #[serde(default = "default_beacon_port")]
    pub beacon_port: u16,

    /// Port the subnet scan knocks on
    #[serde(default = "default_gateway_port")]
    pub scan_port: u16,

    /// Per-host TCP connect budget during the subnet scan
    #[serde(default = "default_scan_connect_timeout_ms")]
    pub scan_connect_timeout_ms: u64,

    /// How many hosts are knocked on at once
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,

    /// Enrich a freshly connected server with a capability probe
    #[serde(default = "default_true")]
    pub probe_on_connect: bool,
}

impl DiscoveryConfig {
    /// Time budget for one attempt of `tier`.
    pub fn timeout_for(&self, tier: DiscoveryTier) -> Duration {
        let ms = match tier {
            DiscoveryTier::Cached => self.cached_timeout_ms,
            DiscoveryTier::LocalAdvertisement => self.advertisement_timeout_ms,
            DiscoveryTier::PeerTransport => self.peer_timeout_ms,
            DiscoveryTier::SubnetScan => self.subnet_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn scan_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_connect_timeout_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cached_timeout_ms: default_cached_timeout_ms(),
            advertisement_timeout_ms: default_advertisement_timeout_ms(),
            peer_timeout_ms: default_peer_timeout_ms(),
            subnet_timeout_ms: default_subnet_timeout_ms(),
            service_type: default_service_type(),
            beacon_port: default_beacon_port(),
            scan_port: default_gateway_port(),
            scan_connect_timeout_ms: default_scan_connect_timeout_ms(),
            scan_concurrency: default_scan_concurrency(),
            probe_on_connect: true,
        }
    }
}

/// Health monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Time between cycles
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,

    /// Budget for checking one server, fallback path included
    #[serde(default = "default_health_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl HealthConfig {
    /// Never zero: a zero period would stall the monitor's ticker.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval_secs(),
            probe_timeout_ms: default_health_timeout_ms(),
        }
    }
}

/// Capability prober settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_management_port")]
    pub management_port: u16,

    /// Budget for the management attempt (contact + capability query)
    #[serde(default = "default_probe_timeout_ms")]
    pub management_timeout_ms: u64,

    #[serde(default = "default_runtime_port")]
    pub runtime_port: u16,

    /// Budget for the direct model-runtime attempt
    #[serde(default = "default_probe_timeout_ms")]
    pub runtime_timeout_ms: u64,
}

impl ProbeConfig {
    pub fn management_timeout(&self) -> Duration {
        Duration::from_millis(self.management_timeout_ms)
    }

    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            management_port: default_management_port(),
            management_timeout_ms: default_probe_timeout_ms(),
            runtime_port: default_runtime_port(),
            runtime_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cached_timeout_ms() -> u64 {
    1_500
}

fn default_advertisement_timeout_ms() -> u64 {
    4_000
}

fn default_peer_timeout_ms() -> u64 {
    3_000
}

fn default_subnet_timeout_ms() -> u64 {
    5_000
}

fn default_service_type() -> String {
    SERVICE_TYPE.to_string()
}

fn default_beacon_port() -> u16 {
    DEFAULT_BEACON_PORT
}

fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_scan_connect_timeout_ms() -> u64 {
    300
}

fn default_scan_concurrency() -> usize {
    64
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_management_port() -> u16 {
    DEFAULT_MANAGEMENT_PORT
}

fn default_runtime_port() -> u16 {
    DEFAULT_OLLAMA_PORT
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_timeouts_widen_down_the_ladder() {
        let cfg = DiscoveryConfig::default();
        assert!(
            cfg.timeout_for(DiscoveryTier::Cached) < cfg.timeout_for(DiscoveryTier::SubnetScan)
        );
        assert_eq!(
            cfg.timeout_for(DiscoveryTier::SubnetScan),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_health_defaults() {
        let cfg = HealthConfig::default();
        assert_eq!(cfg.interval(), Duration::from_secs(30));
        assert_eq!(cfg.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [discovery]
            cached_timeout_ms = 800

            [health]
            interval_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.discovery.cached_timeout_ms, 800);
        assert_eq!(cfg.discovery.scan_port, DEFAULT_GATEWAY_PORT);
        assert_eq!(cfg.health.interval_secs, 10);
        assert_eq!(cfg.health.probe_timeout_ms, 5_000);
        assert_eq!(cfg.probe.management_port, DEFAULT_MANAGEMENT_PORT);
        assert!(cfg.store_path.is_none());
    }

    #[test]
    fn test_zero_health_interval_is_clamped() {
        let cfg: Config = toml::from_str("[health]\ninterval_secs = 0").unwrap();
        assert_eq!(cfg.health.interval_secs, 0);
        assert_eq!(cfg.health.interval(), Duration::from_secs(1));
    }
}
