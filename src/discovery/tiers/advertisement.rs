// Local advertisement tier: browse mDNS/DNS-SD for the companion service.

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;

use super::{TierMatch, TierProbe};
use crate::discovery::DiscoveryTier;
use crate::errors::DiscoveryError;

pub struct AdvertisementTier {
    service_type: String,
}

impl AdvertisementTier {
    pub fn new(service_type: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
        }
    }
}

#[async_trait]
impl TierProbe for AdvertisementTier {
    fn tier(&self) -> DiscoveryTier {
        DiscoveryTier::LocalAdvertisement
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<Option<TierMatch>, DiscoveryError> {
        let daemon = ServiceDaemon::new()
            .map(Browser)
            .map_err(|e| DiscoveryError::Transient(format!("mDNS unavailable: {}", e)))?;
        let receiver = daemon
            .0
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::Transient(format!("mDNS browse failed: {}", e)))?;
        tracing::debug!("Browsing for {}", self.service_type);

        // Runs until resolved or cancelled. The coordinator's timeout may also
        // drop this future; the guard still shuts the daemon down.
        let result = loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break Err(DiscoveryError::Cancelled),
                event = receiver.recv_async() => event,
            };
            match event {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    if let Some(found) = match_from_info(&info, &self.service_type) {
                        tracing::info!("Resolved advertised server {} at {}:{}", found.name, found.host, found.port);
                        break Ok(Some(found));
                    }
                    tracing::debug!("Resolved service {} has no usable address", info.get_fullname());
                }
                Ok(ServiceEvent::SearchStopped(_)) | Err(_) => break Ok(None),
                Ok(other) => tracing::trace!("mDNS event: {:?}", other),
            }
        };

        let _ = daemon.0.stop_browse(&self.service_type);
        result
    }
}

/// Owns the browsing daemon and shuts it down however the probe ends.
struct Browser(ServiceDaemon);

impl Drop for Browser {
    fn drop(&mut self) {
        if let Err(e) = self.0.shutdown() {
            tracing::debug!("mDNS daemon shutdown failed: {}", e);
        }
    }
}

/// Turn a resolved record into a candidate. IPv4 is preferred; the TXT
/// `gateway_port` wins over the SRV port when present.
fn match_from_info(info: &ServiceInfo, service_type: &str) -> Option<TierMatch> {
    let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    let host = pick_address(&addresses)?;
    let port = info
        .get_property_val_str("gateway_port")
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|&p| p != 0)
        .unwrap_or_else(|| info.get_port());
    let name = instance_name(info.get_fullname(), service_type);
    Some(TierMatch::new(name, host.to_string(), port))
}

fn pick_address(addresses: &[IpAddr]) -> Option<IpAddr> {
    addresses
        .iter()
        .find(|a| a.is_ipv4() && !a.is_loopback())
        .or_else(|| addresses.iter().find(|a| !a.is_loopback()))
        .or_else(|| addresses.first())
        .copied()
}

/// `Studio._lanlink._tcp.local.` → `Studio`
fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|n| n.trim_end_matches('.'))
        .filter(|n| !n.is_empty())
        .unwrap_or(fullname)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, Ipv6Addr};

    const TYPE: &str = "_lanlink._tcp.local.";

    #[test]
    fn test_instance_name_strips_service_type() {
        assert_eq!(instance_name("Studio._lanlink._tcp.local.", TYPE), "Studio");
        assert_eq!(instance_name("odd-name", TYPE), "odd-name");
    }

    #[test]
    fn test_prefers_ipv4() {
        let v6 = IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1));
        let v4 = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(pick_address(&[v6, v4]), Some(v4));
        assert_eq!(pick_address(&[v6]), Some(v6));
        assert_eq!(pick_address(&[]), None);
    }

    #[test]
    fn test_txt_gateway_port_wins() {
        let mut props = HashMap::new();
        props.insert("gateway_port".to_string(), "11400".to_string());
        let info = ServiceInfo::new(
            TYPE,
            "Studio",
            "studio.local.",
            "192.168.1.10",
            8766,
            Some(props),
        )
        .unwrap();

        let found = match_from_info(&info, TYPE).unwrap();
        assert_eq!(found.name, "Studio");
        assert_eq!(found.host, "192.168.1.10");
        assert_eq!(found.port, 11400);
    }

    #[test]
    fn test_srv_port_without_txt() {
        let info = ServiceInfo::new(
            TYPE,
            "Studio",
            "studio.local.",
            "192.168.1.10",
            11400,
            None::<HashMap<String, String>>,
        )
        .unwrap();
        assert_eq!(match_from_info(&info, TYPE).unwrap().port, 11400);
    }
}
