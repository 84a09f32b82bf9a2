// Plain-HTTP client plumbing.
//
// All probes go through one reqwest client per component. Timeouts are
// applied per request because each caller has its own budget.

use reqwest::{Client, StatusCode};
use std::net::IpAddr;
use std::time::Duration;

use crate::errors::DiscoveryError;

/// Build the HTTP client used for probes.
///
/// No proxy: everything we talk to is on the local network.
pub fn build_client() -> Result<Client, DiscoveryError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("lanlink/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DiscoveryError::Transient(format!("failed to build HTTP client: {}", e)))
}

/// `http://host:port`, bracketing IPv6 literals.
pub fn base_url(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(addr)) => format!("http://[{}]:{}", addr, port),
        _ => format!("http://{}:{}", host, port),
    }
}

/// GET `path` on `host:port` and return only the status code.
pub async fn get_status(
    client: &Client,
    host: &str,
    port: u16,
    path: &str,
    timeout: Duration,
) -> Result<StatusCode, DiscoveryError> {
    let url = format!("{}{}", base_url(host, port), path);
    tracing::trace!("GET {}", url);
    let resp = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| DiscoveryError::from_http(host, &e))?;
    Ok(resp.status())
}
