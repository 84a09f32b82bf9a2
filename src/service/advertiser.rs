// mDNS/Bonjour service advertisement
//
// Advertises a gateway on the local network so clients' local-advertisement
// tier can find it.

use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::config::constants::{DEFAULT_GATEWAY_PORT, DEFAULT_MANAGEMENT_PORT, SERVICE_TYPE};

/// What to advertise
#[derive(Debug, Clone)]
pub struct AdvertiserConfig {
    /// Instance name; empty means "lanlink-<hostname>"
    pub name: String,
    pub service_type: String,
    pub gateway_port: u16,
    pub management_port: u16,
}

impl Default for AdvertiserConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            service_type: SERVICE_TYPE.to_string(),
            gateway_port: DEFAULT_GATEWAY_PORT,
            management_port: DEFAULT_MANAGEMENT_PORT,
        }
    }
}

/// Service advertisement via mDNS (Bonjour)
pub struct ServiceAdvertiser {
    daemon: ServiceDaemon,
    config: AdvertiserConfig,
    instance_name: String,
}

impl ServiceAdvertiser {
    pub fn new(config: AdvertiserConfig) -> Result<Self> {
        let daemon = ServiceDaemon::new().context("Failed to create mDNS service daemon")?;

        let instance_name = if config.name.is_empty() {
            format!("lanlink-{}", local_hostname())
        } else {
            config.name.clone()
        };

        tracing::debug!("Created mDNS service daemon for {}", instance_name);

        Ok(Self {
            daemon,
            config,
            instance_name,
        })
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// TXT record properties. Clients read `gateway_port` in preference to
    /// the SRV port.
    fn properties(&self, hostname: &str) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        properties.insert("gateway_port".to_string(), self.config.gateway_port.to_string());
        properties.insert(
            "management_port".to_string(),
            self.config.management_port.to_string(),
        );
        properties.insert("hostname".to_string(), hostname.to_string());
        properties.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        properties
    }

    /// Start advertising on `address` (the LAN address clients should use).
    pub fn advertise(&self, address: IpAddr) -> Result<()> {
        let hostname = local_hostname();
        let ip = address.to_string();

        let service_info = ServiceInfo::new(
            &self.config.service_type,
            &self.instance_name,
            &format!("{}.local.", hostname),
            ip.as_str(),
            self.config.gateway_port,
            Some(self.properties(&hostname)),
        )
        .context("Failed to create service info")?;

        self.daemon
            .register(service_info)
            .context("Failed to register mDNS service")?;

        tracing::info!(
            "Advertising service: {} at {} (gateway port {}, management port {})",
            self.instance_name,
            address,
            self.config.gateway_port,
            self.config.management_port
        );

        Ok(())
    }

    /// Stop advertising
    pub fn stop(&self) -> Result<()> {
        // Shutdown unregisters all services
        self.daemon
            .shutdown()
            .context("Failed to stop mDNS service")?;

        tracing::info!("Stopped advertising service: {}", self.instance_name);
        Ok(())
    }
}

/// Hostname without a trailing `.local`
pub fn local_hostname() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    hostname
        .strip_suffix(".local")
        .map(str::to_string)
        .unwrap_or(hostname)
}
