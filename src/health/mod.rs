// Health monitoring for configured servers.

mod monitor;

pub use monitor::{HealthMonitor, HealthReport};
