// Server-side presence: mDNS advertisement and the peer beacon.
//
// Lets a machine running the companion server be found by the discovery
// tiers.

pub mod advertiser;
pub mod beacon;

pub use advertiser::{local_hostname, AdvertiserConfig, ServiceAdvertiser};
pub use beacon::PeerBeacon;
