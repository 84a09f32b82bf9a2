// lanlink - find and keep track of a companion AI server on the local network
// Library exports

pub mod cli;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod health;
pub mod logging;
pub mod network;
pub mod probe;
pub mod service;
pub mod store;

pub use discovery::{
    DiscoveredServer, DiscoveryCoordinator, DiscoveryEvent, DiscoveryMethod, DiscoveryState,
    DiscoveryTier,
};
pub use errors::{DiscoveryError, StoreError};
pub use health::{HealthMonitor, HealthReport};
pub use probe::{CapabilityProber, ServerCapabilities};
pub use store::{ServerConfig, ServerHealthStatus, ServerStore, ServerType};
