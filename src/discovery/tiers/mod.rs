// Discovery tiers.
//
// Each tier is one strategy for turning "somewhere on this network" into a
// host and port. The coordinator owns ordering, timeouts and state; a tier
// only answers "found it", "nothing here" or "something is wrong".

mod advertisement;
mod cached;
mod peer;
mod subnet;

pub use advertisement::AdvertisementTier;
pub use cached::CachedTier;
pub use peer::PeerTransportTier;
pub use subnet::SubnetScanTier;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::DiscoveryTier;
use crate::config::DiscoveryConfig;
use crate::errors::DiscoveryError;
use crate::store::ServerStore;

/// A candidate address produced by a tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierMatch {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl TierMatch {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }
}

/// One discovery strategy.
///
/// Return `Ok(None)` or [`DiscoveryError::NotFound`] / [`DiscoveryError::Transient`]
/// to let the coordinator fall through to the next tier. Any other error
/// aborts the session. Implementations should watch `cancel` inside their
/// own waits; the coordinator also races them against it and against the
/// tier timeout.
#[async_trait]
pub trait TierProbe: Send + Sync {
    fn tier(&self) -> DiscoveryTier;

    async fn probe(&self, cancel: &CancellationToken) -> Result<Option<TierMatch>, DiscoveryError>;
}

/// One of each tier, configured from `config`.
pub fn default_tiers(
    config: &DiscoveryConfig,
    store: Arc<ServerStore>,
    client: Client,
) -> Vec<Arc<dyn TierProbe>> {
    vec![
        Arc::new(CachedTier::new(
            store,
            client.clone(),
            config.timeout_for(DiscoveryTier::Cached),
        )),
        Arc::new(AdvertisementTier::new(config.service_type.clone())),
        Arc::new(PeerTransportTier::new(config.beacon_port)),
        Arc::new(SubnetScanTier::new(client, config)),
    ]
}
