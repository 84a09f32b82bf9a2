// Peer transport tier: broadcast a UDP query, wait for a peer to answer
// with `host=<ip>;port=<n>;name=<s>`.
//
// Answers that don't parse are someone else's traffic and are skipped.

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::{TierMatch, TierProbe};
use crate::config::constants::BEACON_QUERY;
use crate::discovery::entry::endpoint_from_pairs;
use crate::discovery::DiscoveryTier;
use crate::errors::DiscoveryError;

pub struct PeerTransportTier {
    target: SocketAddr,
}

impl PeerTransportTier {
    /// Broadcast on `port` of the limited broadcast address.
    pub fn new(port: u16) -> Self {
        Self::with_target(SocketAddr::from((Ipv4Addr::BROADCAST, port)))
    }

    /// Send the query to a specific address instead of broadcasting.
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }
}

#[async_trait]
impl TierProbe for PeerTransportTier {
    fn tier(&self) -> DiscoveryTier {
        DiscoveryTier::PeerTransport
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<Option<TierMatch>, DiscoveryError> {
        let transient = |e: std::io::Error| DiscoveryError::Transient(format!("peer beacon: {}", e));

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(transient)?;
        socket.set_broadcast(true).map_err(transient)?;
        socket
            .send_to(BEACON_QUERY, self.target)
            .await
            .map_err(transient)?;
        tracing::debug!("Sent peer discovery query to {}", self.target);

        let mut buf = [0u8; 512];
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                received = socket.recv_from(&mut buf) => received,
            };
            let (len, from) = received.map_err(transient)?;
            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                continue;
            };
            match endpoint_from_pairs(text) {
                Ok(endpoint) => {
                    let name = endpoint.name.unwrap_or_else(|| endpoint.host.clone());
                    tracing::info!("Peer {} answered: {}:{}", from, endpoint.host, endpoint.port);
                    return Ok(Some(TierMatch::new(name, endpoint.host, endpoint.port)));
                }
                Err(e) => tracing::debug!("Ignoring unrelated datagram from {}: {}", from, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_peer_reply_is_parsed() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = responder.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = responder.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], BEACON_QUERY);
            responder.send_to(b"not for you", from).await.unwrap();
            responder
                .send_to(b"host=192.168.1.10;port=11400;name=Studio", from)
                .await
                .unwrap();
        });

        let tier = PeerTransportTier::with_target(target);
        let found = tokio::time::timeout(Duration::from_secs(2), tier.probe(&CancellationToken::new()))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(found, TierMatch::new("Studio", "192.168.1.10", 11400));
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let tier = PeerTransportTier::with_target(silent.local_addr().unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(tier.probe(&cancel).await, Err(DiscoveryError::Cancelled));
    }
}
