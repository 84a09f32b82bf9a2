// Command handlers
//
// Each handler builds the components it needs explicitly; nothing is global.

use anyhow::{bail, Context, Result};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Cli, Command, ServersAction};
use crate::config::{self, Config};
use crate::discovery::{self, DiscoveryCoordinator, DiscoveryEvent};
use crate::health::HealthMonitor;
use crate::network;
use crate::probe::CapabilityProber;
use crate::service::{AdvertiserConfig, PeerBeacon, ServiceAdvertiser};
use crate::store::{ServerConfig, ServerStore};

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };

    match cli.command {
        Command::Discover { no_probe } => discover(&config, !no_probe).await,
        Command::Connect { host, port } => connect(&config, &host, &port).await,
        Command::Qr { payload } => qr(&config, &payload).await,
        Command::Servers { action } => servers(&config, action).await,
        Command::Health { watch } => health(&config, watch).await,
        Command::Probe { host, voices } => probe(&config, &host, voices).await,
        Command::Advertise {
            name,
            gateway_port,
            management_port,
            beacon_port,
        } => {
            advertise(
                AdvertiserConfig {
                    name,
                    gateway_port,
                    management_port,
                    ..AdvertiserConfig::default()
                },
                beacon_port,
            )
            .await
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<ServerStore>> {
    let path = config::store_path(config)?;
    let store = ServerStore::open(&path)
        .with_context(|| format!("Failed to open server list at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn coordinator(config: &Config, store: Arc<ServerStore>, probe: bool) -> Result<Arc<DiscoveryCoordinator>> {
    let client = network::build_client()?;
    let mut discovery_config = config.discovery.clone();
    discovery_config.probe_on_connect &= probe;
    let prober = Arc::new(CapabilityProber::new(client.clone(), config.probe.clone()));
    Ok(Arc::new(
        DiscoveryCoordinator::with_default_tiers(discovery_config, store, client).with_prober(prober),
    ))
}

async fn discover(config: &Config, probe: bool) -> Result<()> {
    let store = open_store(config)?;
    let coordinator = coordinator(config, store, probe)?;
    let mut events = coordinator.events();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DiscoveryEvent::State(state)) => {
                    println!("{}", state.describe());
                    if state.is_terminal() && !probe {
                        break;
                    }
                }
                Ok(DiscoveryEvent::Progress(p)) => tracing::debug!("Progress {:.0}%", p * 100.0),
                Ok(DiscoveryEvent::Capabilities(caps)) => {
                    println!("Capabilities: {}", caps.summary);
                    break;
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = tokio::select! {
        outcome = coordinator.start() => outcome,
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel();
            coordinator.start().await
        }
    };

    match outcome {
        Ok(server) => {
            if probe {
                // Give enrichment its own budget, then stop waiting.
                let budget = config.probe.management_timeout() + config.probe.runtime_timeout();
                let _ = tokio::time::timeout(budget, printer).await;
            } else {
                printer.abort();
            }
            println!("Using {}", server.base_url());
            Ok(())
        }
        Err(e) => {
            printer.abort();
            if matches!(e, crate::errors::DiscoveryError::Exhausted) {
                println!("Try `lanlink connect <host>` or `lanlink qr <payload>`.");
            }
            Err(e.into())
        }
    }
}

async fn connect(config: &Config, host: &str, port: &str) -> Result<()> {
    let port = discovery::parse_port(port)?;
    let coordinator = coordinator(config, open_store(config)?, false)?;
    let server = coordinator.configure_manually(host, port).await?;
    println!("Connected to {}", server);
    Ok(())
}

async fn qr(config: &Config, payload: &str) -> Result<()> {
    let coordinator = coordinator(config, open_store(config)?, false)?;
    match coordinator.configure_from_qr_code(payload).await {
        Some(server) => {
            println!("Connected to {}", server);
            Ok(())
        }
        None => bail!("QR code does not contain a server address"),
    }
}

async fn servers(config: &Config, action: ServersAction) -> Result<()> {
    let store = open_store(config)?;
    match action {
        ServersAction::List => {
            let primary = store.primary().await.map(|s| s.id);
            let servers = store.list().await;
            if servers.is_empty() {
                println!("No servers configured. Run `lanlink discover`.");
            }
            for server in servers {
                println!("{}", format_server(&server, primary == Some(server.id)));
            }
        }
        ServersAction::Remove { id } => {
            let id = resolve_id(&store, &id).await?;
            let removed = store.remove(id).await?;
            println!("Removed {}", removed.name);
        }
        ServersAction::Enable { id } => {
            store.set_enabled(resolve_id(&store, &id).await?, true).await?;
        }
        ServersAction::Disable { id } => {
            store.set_enabled(resolve_id(&store, &id).await?, false).await?;
        }
        ServersAction::Primary { id } => {
            store.set_primary(resolve_id(&store, &id).await?).await?;
        }
    }
    Ok(())
}

async fn health(config: &Config, watch: bool) -> Result<()> {
    let store = open_store(config)?;
    let monitor = Arc::new(HealthMonitor::new(
        Arc::clone(&store),
        network::build_client()?,
        config.health.clone(),
    ));

    if watch {
        let shutdown = CancellationToken::new();
        let runner = tokio::spawn(Arc::clone(&monitor).run(shutdown.clone()));
        tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;
        shutdown.cancel();
        runner.await.context("Health monitor task failed")?;
        return Ok(());
    }

    let reports = monitor.run_cycle().await.unwrap_or_default();
    if reports.is_empty() {
        println!("No enabled servers.");
    }
    for report in reports {
        let detail = match (report.response_time_ms, report.error_message) {
            (Some(ms), Some(reason)) => format!(" ({} ms, {})", ms, reason),
            (Some(ms), None) => format!(" ({} ms)", ms),
            (None, Some(reason)) => format!(" ({})", reason),
            (None, None) => String::new(),
        };
        println!("{:<24} {}{}", report.name, report.status, detail);
    }
    Ok(())
}

async fn probe(config: &Config, host: &str, voices_port: Option<u16>) -> Result<()> {
    let host = discovery::entry::validate_host(host)?;
    let prober = CapabilityProber::new(network::build_client()?, config.probe.clone());

    let caps = prober.probe(&host).await;
    println!("{}", caps.summary);
    for model in &caps.llm_models {
        println!("  llm  {}", model);
    }
    for model in &caps.stt_models {
        println!("  stt  {}", model);
    }
    for (service, voices) in &caps.tts_voice_sets {
        println!("  tts  {}: {}", service, voices.join(", "));
    }

    if let Some(port) = voices_port {
        let voices = prober.probe_voices(&host, Some(port)).await;
        println!("Voices on port {}: {}", port, voices.len());
        for voice in voices {
            println!("  {}", voice);
        }
    }
    Ok(())
}

async fn advertise(config: AdvertiserConfig, beacon_port: u16) -> Result<()> {
    let address = network::local_ipv4()
        .map(IpAddr::V4)
        .context("No LAN address found to advertise")?;
    let gateway_port = config.gateway_port;

    let advertiser = ServiceAdvertiser::new(config)?;
    advertiser.advertise(address)?;

    let beacon = PeerBeacon::new(advertiser.instance_name(), address, gateway_port);
    let shutdown = CancellationToken::new();
    let beacon_shutdown = shutdown.clone();
    let beacon_task = tokio::spawn(async move { beacon.serve(beacon_port, beacon_shutdown).await });

    println!("Advertising {} at {}:{} (Ctrl-C to stop)", advertiser.instance_name(), address, gateway_port);
    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;

    shutdown.cancel();
    if let Ok(Err(e)) = beacon_task.await {
        tracing::warn!("Peer beacon stopped with an error: {}", e);
    }
    advertiser.stop()
}

/// Accept a full UUID or a unique prefix of one.
async fn resolve_id(store: &ServerStore, raw: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }
    let prefix = raw.to_ascii_lowercase().replace('-', "");
    let matches: Vec<Uuid> = store
        .list()
        .await
        .into_iter()
        .map(|s| s.id)
        .filter(|id| id.simple().to_string().starts_with(&prefix))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("No server matches '{}'", raw),
        _ => bail!("'{}' matches more than one server", raw),
    }
}

fn format_server(server: &ServerConfig, primary: bool) -> String {
    format!(
        "{} {} {:<20} {:<22} {:<10} {:<9} {}",
        if primary { "*" } else { " " },
        server.short_id(),
        server.name,
        format!("{}:{}", server.host, server.port),
        server.server_type,
        server.health_status,
        if server.is_enabled { "" } else { "(disabled)" },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ServerType;

    #[tokio::test]
    async fn test_resolve_id_by_prefix() {
        let store = ServerStore::in_memory();
        let server = ServerConfig::new("Gateway", "10.0.0.1", 11400, ServerType::Gateway);
        store.add(server.clone()).await.unwrap();

        let prefix = server.short_id();
        assert_eq!(resolve_id(&store, &prefix).await.unwrap(), server.id);
        assert_eq!(
            resolve_id(&store, &server.id.to_string()).await.unwrap(),
            server.id
        );
        assert!(resolve_id(&store, "zzzz").await.is_err());
    }

    #[test]
    fn test_format_server_marks_primary() {
        let server = ServerConfig::new("Gateway", "10.0.0.1", 11400, ServerType::Gateway);
        let line = format_server(&server, true);
        assert!(line.starts_with('*'));
        assert!(line.contains("10.0.0.1:11400"));
        assert!(line.contains("unknown"));
    }
}
