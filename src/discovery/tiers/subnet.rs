// Subnet scan tier: knock on the gateway port of every address in the local
// /24, then confirm responders over HTTP.
//
// Knocks run with bounded concurrency; confirmation is sequential in the
// order responders came back. A responder that answers the port with
// something other than HTTP aborts the session: that is a misconfigured
// server, not an empty network.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{TierMatch, TierProbe};
use crate::config::constants::GENERIC_HEALTH_PATH;
use crate::config::DiscoveryConfig;
use crate::discovery::DiscoveryTier;
use crate::errors::DiscoveryError;
use crate::network;

pub struct SubnetScanTier {
    client: Client,
    port: u16,
    connect_timeout: Duration,
    confirm_timeout: Duration,
    concurrency: usize,
    /// Fixed candidate list; `None` means derive from the local address
    candidates: Option<Vec<IpAddr>>,
}

impl SubnetScanTier {
    pub fn new(client: Client, config: &DiscoveryConfig) -> Self {
        Self {
            client,
            port: config.scan_port,
            connect_timeout: config.scan_connect_timeout(),
            confirm_timeout: Duration::from_secs(2),
            concurrency: config.scan_concurrency.max(1),
            candidates: None,
        }
    }

    /// Scan exactly these addresses instead of the local subnet.
    pub fn with_candidates(mut self, candidates: Vec<IpAddr>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn candidates(&self) -> Vec<IpAddr> {
        if let Some(fixed) = &self.candidates {
            return fixed.clone();
        }
        match network::local_ipv4() {
            Some(own) => {
                tracing::debug!("Scanning the /24 around {}", own);
                network::subnet_hosts(own).into_iter().map(IpAddr::V4).collect()
            }
            None => {
                tracing::debug!("No private IPv4 address, nothing to scan");
                Vec::new()
            }
        }
    }

    async fn confirm(&self, host: IpAddr) -> Result<Option<TierMatch>, DiscoveryError> {
        let host_str = host.to_string();
        match network::get_status(
            &self.client,
            &host_str,
            self.port,
            GENERIC_HEALTH_PATH,
            self.confirm_timeout,
        )
        .await
        {
            Ok(code) if code.is_success() => Ok(Some(TierMatch::new(
                host_str.clone(),
                host_str,
                self.port,
            ))),
            Ok(code) => {
                tracing::debug!("{} has the port open but answered {}", host, code);
                Ok(None)
            }
            Err(e) if e.is_fallthrough() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TierProbe for SubnetScanTier {
    fn tier(&self) -> DiscoveryTier {
        DiscoveryTier::SubnetScan
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<Option<TierMatch>, DiscoveryError> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(DiscoveryError::NotFound);
        }
        tracing::debug!("Scanning {} hosts on port {}", candidates.len(), self.port);

        let port = self.port;
        let connect_timeout = self.connect_timeout;
        let open_hosts = stream::iter(candidates)
            .map(|host| async move {
                let addr = SocketAddr::new(host, port);
                match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_)) => Some(host),
                    _ => None,
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|host| async move { host });
        tokio::pin!(open_hosts);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                next = open_hosts.next() => next,
            };
            let Some(host) = next else {
                return Ok(None);
            };
            tracing::debug!("Port open on {}, confirming", host);
            if let Some(found) = self.confirm(host).await? {
                tracing::info!("Subnet scan found server at {}:{}", found.host, found.port);
                return Ok(Some(found));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::build_client;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn test_finds_healthy_responder() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;
        let port = server.socket_address().port();

        let tier = SubnetScanTier::new(build_client().unwrap(), &DiscoveryConfig::default())
            .with_port(port)
            .with_candidates(vec![loopback()]);
        let found = tier.probe(&CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(found.host, "127.0.0.1");
        assert_eq!(found.port, port);
    }

    #[tokio::test]
    async fn test_closed_port_finds_nothing() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let tier = SubnetScanTier::new(build_client().unwrap(), &DiscoveryConfig::default())
            .with_port(port)
            .with_candidates(vec![loopback()]);
        assert_eq!(tier.probe(&CancellationToken::new()).await, Ok(None));
    }

    #[tokio::test]
    async fn test_empty_candidate_list_is_not_found() {
        let tier = SubnetScanTier::new(build_client().unwrap(), &DiscoveryConfig::default())
            .with_candidates(Vec::new());
        assert_eq!(
            tier.probe(&CancellationToken::new()).await,
            Err(DiscoveryError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_non_http_responder_is_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = [0u8; 1024];
                    let _ = socket.read(&mut request).await;
                    let _ = socket.write_all(b"SSH-2.0-OpenSSH_9.6\r\n\r\n").await;
                    let _ = socket.shutdown().await;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                });
            }
        });

        let tier = SubnetScanTier::new(build_client().unwrap(), &DiscoveryConfig::default())
            .with_port(port)
            .with_candidates(vec![loopback()]);
        let err = tier.probe(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Protocol { .. }));
    }
}
