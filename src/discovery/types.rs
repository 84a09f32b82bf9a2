// Discovery data types: tiers, methods, the session state machine and the
// server value a successful discovery produces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One discovery strategy. Declaration order is the fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryTier {
    /// Reconnect to the last server we were connected to
    Cached,
    /// mDNS/DNS-SD browse
    LocalAdvertisement,
    /// UDP broadcast beacon answered by a peer
    PeerTransport,
    /// Knock on every address of the local subnet
    SubnetScan,
}

impl DiscoveryTier {
    pub const ALL: [DiscoveryTier; 4] = [
        DiscoveryTier::Cached,
        DiscoveryTier::LocalAdvertisement,
        DiscoveryTier::PeerTransport,
        DiscoveryTier::SubnetScan,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DiscoveryTier::Cached => "cached",
            DiscoveryTier::LocalAdvertisement => "local advertisement",
            DiscoveryTier::PeerTransport => "peer transport",
            DiscoveryTier::SubnetScan => "subnet scan",
        }
    }
}

impl fmt::Display for DiscoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a server was found. Labels only; never drives fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Cached,
    LocalAdvertisement,
    PeerTransport,
    SubnetScan,
    Manual,
    QrCode,
}

impl From<DiscoveryTier> for DiscoveryMethod {
    fn from(tier: DiscoveryTier) -> Self {
        match tier {
            DiscoveryTier::Cached => DiscoveryMethod::Cached,
            DiscoveryTier::LocalAdvertisement => DiscoveryMethod::LocalAdvertisement,
            DiscoveryTier::PeerTransport => DiscoveryMethod::PeerTransport,
            DiscoveryTier::SubnetScan => DiscoveryMethod::SubnetScan,
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiscoveryMethod::Cached => "cached",
            DiscoveryMethod::LocalAdvertisement => "local advertisement",
            DiscoveryMethod::PeerTransport => "peer transport",
            DiscoveryMethod::SubnetScan => "subnet scan",
            DiscoveryMethod::Manual => "manual",
            DiscoveryMethod::QrCode => "QR code",
        };
        f.write_str(label)
    }
}

/// A reachable endpoint. Immutable: a new discovery produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredServer {
    name: String,
    host: String,
    port: u16,
    discovery_method: DiscoveryMethod,
}

impl DiscoveredServer {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        discovery_method: DiscoveryMethod,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            discovery_method,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn discovery_method(&self) -> DiscoveryMethod {
        self.discovery_method
    }

    /// Plain-HTTP base URL the rest of the system talks to.
    pub fn base_url(&self) -> String {
        crate::network::base_url(&self.host, self.port)
    }
}

impl fmt::Display for DiscoveredServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}, via {})",
            self.name, self.host, self.port, self.discovery_method
        )
    }
}

/// Discovery state machine.
///
/// `TryingTier` only appears inside an active session. `Connected`,
/// `ManualConfigRequired` and `Failed` end an attempt but never block the
/// next one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DiscoveryState {
    #[default]
    Idle,
    Discovering,
    TryingTier(DiscoveryTier),
    Connected(DiscoveredServer),
    ManualConfigRequired,
    Failed(String),
}

impl DiscoveryState {
    /// A session is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DiscoveryState::Discovering | DiscoveryState::TryingTier(_)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiscoveryState::Connected(_)
                | DiscoveryState::ManualConfigRequired
                | DiscoveryState::Failed(_)
        )
    }

    pub fn server(&self) -> Option<&DiscoveredServer> {
        match self {
            DiscoveryState::Connected(server) => Some(server),
            _ => None,
        }
    }

    /// Text for a status line. Never a raw transport error.
    pub fn describe(&self) -> String {
        match self {
            DiscoveryState::Idle => "Idle".to_string(),
            DiscoveryState::Discovering => "Searching for server...".to_string(),
            DiscoveryState::TryingTier(tier) => format!("Still searching ({})...", tier),
            DiscoveryState::Connected(server) => format!("Connected to {}", server),
            DiscoveryState::ManualConfigRequired => "Manual setup required".to_string(),
            DiscoveryState::Failed(message) => format!("Discovery failed: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order_is_fallback_order() {
        let mut shuffled = vec![
            DiscoveryTier::SubnetScan,
            DiscoveryTier::Cached,
            DiscoveryTier::PeerTransport,
            DiscoveryTier::LocalAdvertisement,
        ];
        shuffled.sort();
        assert_eq!(shuffled, DiscoveryTier::ALL.to_vec());
    }

    #[test]
    fn test_method_from_tier() {
        assert_eq!(
            DiscoveryMethod::from(DiscoveryTier::SubnetScan),
            DiscoveryMethod::SubnetScan
        );
        assert_eq!(
            DiscoveryMethod::from(DiscoveryTier::Cached),
            DiscoveryMethod::Cached
        );
    }

    #[test]
    fn test_state_classification() {
        let server = DiscoveredServer::new("gw", "10.0.0.5", 11400, DiscoveryMethod::Manual);
        assert!(DiscoveryState::Discovering.is_active());
        assert!(DiscoveryState::TryingTier(DiscoveryTier::Cached).is_active());
        assert!(!DiscoveryState::Idle.is_active());
        assert!(DiscoveryState::Connected(server.clone()).is_terminal());
        assert!(DiscoveryState::ManualConfigRequired.is_terminal());
        assert!(!DiscoveryState::Idle.is_terminal());
        assert_eq!(DiscoveryState::Connected(server.clone()).server(), Some(&server));
    }

    #[test]
    fn test_server_base_url() {
        let server = DiscoveredServer::new("gw", "192.168.1.10", 11400, DiscoveryMethod::QrCode);
        assert_eq!(server.base_url(), "http://192.168.1.10:11400");
    }
}
