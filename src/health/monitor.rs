// Server health monitor.
//
// Every `interval` the enabled servers are re-probed. Probes run side by
// side and each result is written to the store the moment it arrives, so a
// server that hangs until its timeout never holds up the others. A cycle
// requested while one is still running is dropped, not queued.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::constants::GENERIC_HEALTH_PATH;
use crate::config::HealthConfig;
use crate::errors::DiscoveryError;
use crate::network;
use crate::store::{HealthUpdate, ServerConfig, ServerHealthStatus, ServerStore};

/// Outcome for one server in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub id: Uuid,
    pub name: String,
    pub status: ServerHealthStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
}

pub struct HealthMonitor {
    store: Arc<ServerStore>,
    client: Client,
    config: HealthConfig,
    cycle_running: AtomicBool,
}

/// Clears the running flag however the cycle ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl HealthMonitor {
    pub fn new(store: Arc<ServerStore>, client: Client, config: HealthConfig) -> Self {
        Self {
            store,
            client,
            config,
            cycle_running: AtomicBool::new(false),
        }
    }

    pub fn is_cycle_running(&self) -> bool {
        self.cycle_running.load(Ordering::SeqCst)
    }

    /// Run the monitor until `shutdown` fires. The first cycle starts
    /// immediately.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Health monitor started (every {:?})", self.config.interval());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let monitor = Arc::clone(&self);
            // Cycles run detached so a slow one never delays the next tick;
            // the guard suppresses overlap.
            tokio::spawn(async move {
                monitor.run_cycle().await;
            });
        }

        info!("Health monitor stopped");
    }

    /// Check every enabled server once.
    ///
    /// Returns `None` if another cycle is already running. Reports come back
    /// in completion order.
    pub async fn run_cycle(&self) -> Option<Vec<HealthReport>> {
        if self
            .cycle_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Health cycle already running, skipping");
            return None;
        }
        let _guard = CycleGuard(&self.cycle_running);

        let servers = self.store.list_enabled().await;
        if servers.is_empty() {
            debug!("No enabled servers to check");
            return Some(Vec::new());
        }
        debug!("Starting health cycle for {} servers", servers.len());

        for server in &servers {
            self.apply(server, HealthUpdate::status_only(ServerHealthStatus::Checking))
                .await;
        }

        let mut checks: FuturesUnordered<_> = servers
            .iter()
            .map(|server| async move { (server, self.check_server(server).await) })
            .collect();

        let mut reports = Vec::with_capacity(servers.len());
        while let Some((server, update)) = checks.next().await {
            let report = HealthReport {
                id: server.id,
                name: server.name.clone(),
                status: update.status,
                response_time_ms: update.response_time_ms,
                error_message: update.error_message.clone(),
            };
            if update.status != server.health_status {
                info!("{} health changed: {} -> {}", server.name, server.health_status, update.status);
            }
            self.apply(server, update).await;
            reports.push(report);
        }

        Some(reports)
    }

    /// Probe one server: 200 is healthy, any other answer is degraded, no
    /// answer within the budget is unhealthy.
    ///
    /// The type-specific path is tried first; if it answers with something
    /// other than 200 the generic `/health` path gets a chance too.
    pub async fn check_server(&self, server: &ServerConfig) -> HealthUpdate {
        let started = Instant::now();
        let budget = self.config.probe_timeout();
        let path = server.server_type.health_path();

        let probe = async {
            let status =
                network::get_status(&self.client, &server.host, server.port, path, budget).await?;
            if status == StatusCode::OK {
                return Ok(None);
            }
            if path != GENERIC_HEALTH_PATH {
                let fallback = network::get_status(
                    &self.client,
                    &server.host,
                    server.port,
                    GENERIC_HEALTH_PATH,
                    budget,
                )
                .await;
                if matches!(fallback, Ok(StatusCode::OK)) {
                    return Ok(None);
                }
            }
            debug!("{} answered {} on {}", server.name, status, path);
            Ok::<_, DiscoveryError>(Some(status))
        };

        let (status, error_message) = match tokio::time::timeout(budget, probe).await {
            Ok(Ok(None)) => (ServerHealthStatus::Healthy, None),
            Ok(Ok(Some(code))) => (
                ServerHealthStatus::Degraded,
                Some(format!("HTTP {}", code.as_u16())),
            ),
            // Connected, but the reply was not HTTP
            Ok(Err(DiscoveryError::Protocol { .. })) => (
                ServerHealthStatus::Degraded,
                Some("Invalid response".to_string()),
            ),
            Ok(Err(e)) => {
                debug!("Health check of {} failed: {}", server.name, e);
                // The client's own request timeout can fire before ours.
                let reason = if started.elapsed() >= budget {
                    "Timeout"
                } else {
                    "Connection failed"
                };
                (ServerHealthStatus::Unhealthy, Some(reason.to_string()))
            }
            Err(_) => {
                debug!("Health check of {} timed out", server.name);
                (ServerHealthStatus::Unhealthy, Some("Timeout".to_string()))
            }
        };

        let elapsed = started.elapsed();
        HealthUpdate {
            status,
            checked_at: Some(Utc::now()),
            response_time_ms: status
                .is_usable()
                .then(|| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
            error_message,
        }
    }

    async fn apply(&self, server: &ServerConfig, update: HealthUpdate) {
        if let Err(e) = self.store.record_health(server.id, update).await {
            warn!("Failed to record health of {}: {}", server.name, e);
        }
    }
}
