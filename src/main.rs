// lanlink - find and monitor a companion AI server on the local network
// Main entry point

use anyhow::Result;
use clap::Parser;

use lanlink::cli::{self, Cli};
use lanlink::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose)?;
    cli::run(cli).await
}
