// Logging setup
//
// tracing-subscriber with an env filter. RUST_LOG wins when set; otherwise
// `lanlink=info` (or debug with --verbose). `log` records from dependencies
// (mdns-sd) are bridged into tracing.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "lanlink=debug" } else { "lanlink=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    Ok(())
}
