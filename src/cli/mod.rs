// CLI module
// Argument parsing and command dispatch for the `lanlink` binary

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::constants::{DEFAULT_BEACON_PORT, DEFAULT_GATEWAY_PORT, DEFAULT_MANAGEMENT_PORT};

pub use commands::run;

#[derive(Debug, Parser)]
#[command(name = "lanlink", version, about = "Find and monitor a companion AI server on the local network")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ~/.lanlink/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the network for a server and connect to it
    Discover {
        /// Skip the capability probe after connecting
        #[arg(long)]
        no_probe: bool,
    },
    /// Connect to a server by address
    Connect {
        host: String,
        #[arg(short, long, default_value_t = DEFAULT_GATEWAY_PORT.to_string())]
        port: String,
    },
    /// Connect using the text of a scanned QR code
    Qr { payload: String },
    /// Manage known servers
    Servers {
        #[command(subcommand)]
        action: ServersAction,
    },
    /// Check the health of every enabled server
    Health {
        /// Keep checking on the configured interval
        #[arg(long)]
        watch: bool,
    },
    /// Show which model and voice services a host exposes
    Probe {
        host: String,
        /// Also list voices from a TTS server on this port
        #[arg(long)]
        voices: Option<u16>,
    },
    /// Make this machine discoverable (mDNS + peer beacon) until Ctrl-C
    Advertise {
        /// Instance name (default: lanlink-<hostname>)
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value_t = DEFAULT_GATEWAY_PORT)]
        gateway_port: u16,
        #[arg(long, default_value_t = DEFAULT_MANAGEMENT_PORT)]
        management_port: u16,
        #[arg(long, default_value_t = DEFAULT_BEACON_PORT)]
        beacon_port: u16,
    },
}

#[derive(Debug, Subcommand)]
pub enum ServersAction {
    /// List known servers
    List,
    /// Forget a server (id or id prefix)
    Remove { id: String },
    /// Include a server in health checks
    Enable { id: String },
    /// Exclude a server from health checks
    Disable { id: String },
    /// Make a server the primary connection
    Primary { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_connect_default_port() {
        let cli = Cli::parse_from(["lanlink", "connect", "192.168.1.10"]);
        match cli.command {
            Command::Connect { host, port } => {
                assert_eq!(host, "192.168.1.10");
                assert_eq!(port, "11400");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_servers_subcommand() {
        let cli = Cli::parse_from(["lanlink", "-v", "servers", "remove", "550e8400"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Servers {
                action: ServersAction::Remove { .. }
            }
        ));
    }
}
