// Cached tier: try the server we were last connected to.
//
// Purely a latency shortcut. Every failure here is silent and falls through.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{TierMatch, TierProbe};
use crate::config::constants::GENERIC_HEALTH_PATH;
use crate::discovery::DiscoveryTier;
use crate::errors::DiscoveryError;
use crate::network;
use crate::store::ServerStore;

pub struct CachedTier {
    store: Arc<ServerStore>,
    client: Client,
    timeout: Duration,
}

impl CachedTier {
    pub fn new(store: Arc<ServerStore>, client: Client, timeout: Duration) -> Self {
        Self {
            store,
            client,
            timeout,
        }
    }
}

#[async_trait]
impl TierProbe for CachedTier {
    fn tier(&self) -> DiscoveryTier {
        DiscoveryTier::Cached
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<Option<TierMatch>, DiscoveryError> {
        let Some(last) = self.store.last_connected().await else {
            tracing::debug!("No previous server to reconnect to");
            return Ok(None);
        };

        let check = network::get_status(
            &self.client,
            last.host(),
            last.port(),
            GENERIC_HEALTH_PATH,
            self.timeout,
        );
        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            status = check => status,
        };

        match status {
            Ok(code) if code.is_success() => {
                tracing::info!("Previous server {}:{} still reachable", last.host(), last.port());
                Ok(Some(TierMatch::new(last.name(), last.host(), last.port())))
            }
            Ok(code) => {
                tracing::debug!("Previous server {} answered {}", last.host(), code);
                Ok(None)
            }
            Err(e) => {
                // Even a garbled answer is only a reason to look elsewhere here.
                tracing::debug!("Previous server {} not reachable: {}", last.host(), e);
                Ok(None)
            }
        }
    }
}
