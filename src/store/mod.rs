// Server config store: persisted list of known servers and the primary
// connection.

mod server_config;
mod server_store;

pub use server_config::{ServerConfig, ServerHealthStatus, ServerType};
pub use server_store::{HealthUpdate, ServerStore};
