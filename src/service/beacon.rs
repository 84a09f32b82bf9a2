// Peer beacon responder: answers the peer transport tier's UDP query with
// this machine's gateway address.

use std::net::{IpAddr, Ipv4Addr};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::constants::BEACON_QUERY;

pub struct PeerBeacon {
    name: String,
    address: IpAddr,
    gateway_port: u16,
}

impl PeerBeacon {
    pub fn new(name: impl Into<String>, address: IpAddr, gateway_port: u16) -> Self {
        Self {
            name: name.into(),
            address,
            gateway_port,
        }
    }

    /// Reply body, in the same `key=value;` form QR payloads use.
    pub fn reply(&self) -> String {
        format!(
            "host={};port={};name={}",
            self.address, self.gateway_port, self.name
        )
    }

    /// Answer queries arriving on `port` until `shutdown` fires.
    pub async fn serve(&self, port: u16, shutdown: CancellationToken) -> std::io::Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        tracing::info!("Peer beacon listening on port {} ({})", port, self.reply());
        self.serve_on(socket, shutdown).await
    }

    /// Answer queries on an already bound socket.
    pub async fn serve_on(&self, socket: UdpSocket, shutdown: CancellationToken) -> std::io::Result<()> {
        let reply = self.reply();
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                received = socket.recv_from(&mut buf) => received?,
            };
            if &buf[..len] != BEACON_QUERY {
                continue;
            }
            tracing::debug!("Answering discovery query from {}", from);
            if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
                tracing::debug!("Beacon reply to {} failed: {}", from, e);
            }
        }
    }
}
