// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{app_dir, load_config, load_config_from, store_path};
pub use settings::{Config, DiscoveryConfig, HealthConfig, ProbeConfig};
