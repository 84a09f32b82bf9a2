// Network helpers shared by the discovery tiers, the prober and the health
// monitor: HTTP client construction, URL building and local address lookup.

pub mod client;
pub mod local;

pub use client::{base_url, build_client, get_status};
pub use local::{local_ipv4, subnet_hosts};
