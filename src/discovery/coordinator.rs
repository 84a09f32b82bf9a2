// Discovery coordinator: owns the discovery state machine.
//
// At most one session runs at a time. A session walks the tiers in
// ascending order, one at a time, each under its own timeout, and stops at
// the first tier that produces a server. Tiers that find nothing (or time
// out, or can't reach the network) fall through; anything else aborts the
// session as `Failed`.
//
// State is pushed, not polled: `subscribe()` hands out a watch receiver for
// the latest state and `events()` a broadcast receiver that sees every
// transition and progress step in order.
//
// Sessions carry a generation number. Out-of-band connections (QR, manual)
// bump it, which silences whatever the superseded session still has to say.

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::entry::{self, EntryError};
use super::tiers::{self, TierProbe};
use super::types::{DiscoveredServer, DiscoveryMethod, DiscoveryState, DiscoveryTier};
use crate::config::DiscoveryConfig;
use crate::errors::DiscoveryError;
use crate::probe::{CapabilityProber, ServerCapabilities};
use crate::store::ServerStore;

const EVENT_BUFFER: usize = 64;

/// Everything observable about the coordinator, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    State(DiscoveryState),
    Progress(f64),
    Capabilities(ServerCapabilities),
}

type SessionResult = Result<DiscoveredServer, DiscoveryError>;

struct Session {
    generation: u64,
    cancel: CancellationToken,
    result: Shared<BoxFuture<'static, SessionResult>>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    session: Option<Session>,
}

pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,
    tiers: Vec<Arc<dyn TierProbe>>,
    store: Arc<ServerStore>,
    prober: Option<Arc<CapabilityProber>>,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<DiscoveryState>,
    progress_tx: watch::Sender<f64>,
    capabilities_tx: watch::Sender<Option<ServerCapabilities>>,
    events_tx: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoveryCoordinator {
    /// Build a coordinator over `tiers`. They are sorted into fallback order
    /// here, whatever order they were passed in.
    pub fn new(
        config: DiscoveryConfig,
        store: Arc<ServerStore>,
        mut tiers: Vec<Arc<dyn TierProbe>>,
    ) -> Self {
        tiers.sort_by_key(|t| t.tier());
        let (state_tx, _) = watch::channel(DiscoveryState::Idle);
        let (progress_tx, _) = watch::channel(0.0);
        let (capabilities_tx, _) = watch::channel(None);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            tiers,
            store,
            prober: None,
            slot: Mutex::new(Slot::default()),
            state_tx,
            progress_tx,
            capabilities_tx,
            events_tx,
        }
    }

    /// The full ladder: cached, mDNS, peer beacon, subnet scan.
    pub fn with_default_tiers(config: DiscoveryConfig, store: Arc<ServerStore>, client: Client) -> Self {
        let tiers = tiers::default_tiers(&config, Arc::clone(&store), client);
        Self::new(config, store, tiers)
    }

    /// Enrich every new connection with a capability probe.
    pub fn with_prober(mut self, prober: Arc<CapabilityProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn tiers(&self) -> Vec<DiscoveryTier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    pub fn state(&self) -> DiscoveryState {
        self.state_tx.borrow().clone()
    }

    /// Session progress in `[0, 1]`, non-decreasing within a session.
    pub fn progress(&self) -> f64 {
        *self.progress_tx.borrow()
    }

    pub fn current_tier(&self) -> Option<DiscoveryTier> {
        match *self.state_tx.borrow() {
            DiscoveryState::TryingTier(tier) => Some(tier),
            _ => None,
        }
    }

    /// Capabilities of the connected server, once probed.
    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.capabilities_tx.borrow().clone()
    }

    /// Latest state, updated on every transition.
    pub fn subscribe(&self) -> watch::Receiver<DiscoveryState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress_tx.subscribe()
    }

    /// Every transition, progress step and capability update, in order.
    pub fn events(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events_tx.subscribe()
    }

    /// Run discovery, or join the session already running.
    ///
    /// Resolves to the discovered server, [`DiscoveryError::Exhausted`] when
    /// every tier came up empty, [`DiscoveryError::Cancelled`] when cancelled
    /// or superseded, or the error that aborted the session.
    pub async fn start(self: &Arc<Self>) -> SessionResult {
        let result = {
            let mut slot = self.lock_slot();
            match &slot.session {
                Some(session) => {
                    debug!("Discovery session {} already running, joining", session.generation);
                    session.result.clone()
                }
                None => {
                    slot.generation += 1;
                    let generation = slot.generation;
                    let cancel = CancellationToken::new();

                    self.publish_state(DiscoveryState::Discovering);
                    self.publish_progress(0.0);
                    info!("Discovery session {} started ({} tiers)", generation, self.tiers.len());

                    let task = tokio::spawn(Arc::clone(self).run_session(generation, cancel.clone()));
                    let result = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(DiscoveryError::Transient(format!(
                                "discovery task stopped unexpectedly: {}",
                                e
                            )))
                        })
                    }
                    .boxed()
                    .shared();

                    slot.session = Some(Session {
                        generation,
                        cancel,
                        result: result.clone(),
                    });
                    result
                }
            }
        };
        result.await
    }

    /// Stop the running session, if any, and return to `Idle`.
    ///
    /// The session is detached at once: the tier in flight is abandoned at
    /// its next await point, its `start()` callers resolve to
    /// [`DiscoveryError::Cancelled`], and a `start()` issued right after this
    /// begins a fresh session.
    pub fn cancel(&self) {
        let mut slot = self.lock_slot();
        if let Some(session) = slot.session.take() {
            info!("Cancelling discovery session {}", session.generation);
            slot.generation += 1;
            session.cancel.cancel();
        }
        self.publish_state(DiscoveryState::Idle);
        self.publish_progress(0.0);
    }

    /// Connect from a scanned QR code.
    ///
    /// A payload without a host and port is ignored: it was most likely a
    /// code meant for something else. Returns `None` in that case and the
    /// state is left untouched.
    pub async fn configure_from_qr_code(self: &Arc<Self>, payload: &str) -> Option<DiscoveredServer> {
        let endpoint = match entry::parse_qr_payload(payload) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                debug!("Ignoring QR code: {}", e);
                return None;
            }
        };
        let name = endpoint.name.unwrap_or_else(|| endpoint.host.clone());
        let server = DiscoveredServer::new(name, endpoint.host, endpoint.port, DiscoveryMethod::QrCode);
        Some(self.connect_out_of_band(server).await)
    }

    /// Connect to a hand-entered host and port.
    pub async fn configure_manually(self: &Arc<Self>, host: &str, port: u16) -> SessionResult {
        let host = entry::validate_host(host).map_err(|e| DiscoveryError::MalformedInput(e.to_string()))?;
        if port == 0 {
            return Err(DiscoveryError::MalformedInput(
                EntryError::InvalidPort(port.to_string()).to_string(),
            ));
        }
        let server = DiscoveredServer::new(host.clone(), host, port, DiscoveryMethod::Manual);
        Ok(self.connect_out_of_band(server).await)
    }

    async fn connect_out_of_band(self: &Arc<Self>, server: DiscoveredServer) -> DiscoveredServer {
        let generation = {
            let mut slot = self.lock_slot();
            slot.generation += 1;
            if let Some(session) = slot.session.take() {
                debug!("Out-of-band connection supersedes discovery session {}", session.generation);
                session.cancel.cancel();
            }
            info!("Connected out of band to {}", server);
            self.publish_state(DiscoveryState::Connected(server.clone()));
            self.publish_progress(1.0);
            slot.generation
        };
        self.remember(&server, generation).await;
        server
    }

    async fn run_session(self: Arc<Self>, generation: u64, cancel: CancellationToken) -> SessionResult {
        let mut outcome = self.walk_tiers(generation, &cancel).await;
        if let Ok(server) = &outcome {
            if cancel.is_cancelled() {
                debug!("Found {} but the session was cancelled", server);
                outcome = Err(DiscoveryError::Cancelled);
            }
        }

        {
            let mut slot = self.lock_slot();
            if slot.session.as_ref().is_some_and(|s| s.generation == generation) {
                slot.session = None;
            }
            if slot.generation != generation {
                // Superseded; the newer owner has already published its state.
                return Err(DiscoveryError::Cancelled);
            }

            match &outcome {
                Ok(server) => {
                    info!("Discovery succeeded: {}", server);
                    self.publish_state(DiscoveryState::Connected(server.clone()));
                    self.publish_progress(1.0);
                }
                Err(DiscoveryError::Cancelled) => {
                    info!("Discovery cancelled");
                    self.publish_state(DiscoveryState::Idle);
                    self.publish_progress(0.0);
                }
                Err(DiscoveryError::Exhausted) => {
                    info!("No tier found a server, manual setup required");
                    self.publish_state(DiscoveryState::ManualConfigRequired);
                }
                Err(e) => {
                    warn!("Discovery aborted: {}", e);
                    self.publish_state(DiscoveryState::Failed(e.to_string()));
                }
            }
        }

        if let Ok(server) = &outcome {
            self.remember(server, generation).await;
        }
        outcome
    }

    async fn walk_tiers(&self, generation: u64, cancel: &CancellationToken) -> SessionResult {
        let total = self.tiers.len();

        for (index, probe) in self.tiers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
            let tier = probe.tier();
            self.publish_for(generation, DiscoveryState::TryingTier(tier), index as f64 / total as f64);

            let budget = self.config.timeout_for(tier);
            debug!("Trying {} (timeout {:?})", tier, budget);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                outcome = tokio::time::timeout(budget, probe.probe(cancel)) => outcome,
            };

            match outcome {
                Ok(Ok(Some(found))) => {
                    return Ok(DiscoveredServer::new(found.name, found.host, found.port, tier.into()));
                }
                Ok(Ok(None)) => debug!("{} found nothing", tier),
                Ok(Err(DiscoveryError::Cancelled)) => return Err(DiscoveryError::Cancelled),
                Ok(Err(e)) if e.is_fallthrough() => debug!("{} failed, falling through: {}", tier, e),
                Ok(Err(e)) => {
                    warn!("{} hit an unexpected error: {}", tier, e);
                    return Err(e);
                }
                Err(_) => debug!("{} timed out", tier),
            }
        }

        Err(DiscoveryError::Exhausted)
    }

    /// Persist a new connection and kick off enrichment.
    ///
    /// The store write only happens while `generation` is still current, so a
    /// connection that was superseded after publishing never overwrites the
    /// newer one on disk.
    async fn remember(self: &Arc<Self>, server: &DiscoveredServer, generation: u64) {
        let still_current = || self.lock_slot().generation == generation;
        match self.store.remember_connection_if(server, still_current).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Connection to {} was superseded before it was saved", server);
                return;
            }
            Err(e) => warn!("Failed to save discovered server {}: {}", server, e),
        }

        // Old capabilities never outlive the connection they described.
        self.capabilities_tx.send_replace(None);

        let Some(prober) = self.prober.clone() else {
            return;
        };
        if !self.config.probe_on_connect {
            return;
        }
        let this = Arc::clone(self);
        let server = server.clone();
        tokio::spawn(async move {
            let caps = prober.probe(server.host()).await;
            if this.state().server() != Some(&server) {
                debug!("Connection changed while probing {}, dropping capabilities", server);
                return;
            }
            this.capabilities_tx.send_replace(Some(caps.clone()));
            let _ = this.events_tx.send(DiscoveryEvent::Capabilities(caps));
        });
    }

    fn publish_for(&self, generation: u64, state: DiscoveryState, progress: f64) {
        let slot = self.lock_slot();
        if slot.generation != generation {
            return;
        }
        self.publish_state(state);
        self.publish_progress(progress);
    }

    fn publish_state(&self, state: DiscoveryState) {
        self.state_tx.send_replace(state.clone());
        let _ = self.events_tx.send(DiscoveryEvent::State(state));
    }

    fn publish_progress(&self, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        let changed = self.progress_tx.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress;
                true
            }
        });
        if changed {
            let _ = self.events_tx.send(DiscoveryEvent::Progress(progress));
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
