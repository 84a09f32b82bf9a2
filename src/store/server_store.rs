// Server store: sole owner of the known-server list and the primary pointer.
//
// Every operation takes the same async mutex, so a health write and a user
// delete can never interleave. Readers get copies. When a path is set the
// whole state is rewritten (temp file + rename) after each mutation, before
// the lock is released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::server_config::{ServerConfig, ServerHealthStatus};
use crate::discovery::DiscoveredServer;
use crate::errors::StoreError;

/// On-disk layout: ordered records plus a nullable primary reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    servers: Vec<ServerConfig>,
    #[serde(default)]
    primary: Option<Uuid>,
    /// Last server a discovery connected to; feeds the cached tier
    #[serde(default)]
    last_connected: Option<DiscoveredServer>,
}

/// Result of one liveness check, applied through [`ServerStore::record_health`].
#[derive(Debug, Clone, PartialEq)]
pub struct HealthUpdate {
    pub status: ServerHealthStatus,
    pub checked_at: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
    /// Why the server is not healthy ("Timeout", "HTTP 503", ...)
    pub error_message: Option<String>,
}

impl HealthUpdate {
    pub fn status_only(status: ServerHealthStatus) -> Self {
        Self {
            status,
            checked_at: None,
            response_time_ms: None,
            error_message: None,
        }
    }
}

pub struct ServerStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl ServerStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            })?
        } else {
            StoreState::default()
        };
        tracing::debug!("Opened server store at {} ({} servers)", path.display(), state.servers.len());
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn list(&self) -> Vec<ServerConfig> {
        self.state.lock().await.servers.clone()
    }

    /// Servers the health monitor should watch.
    pub async fn list_enabled(&self) -> Vec<ServerConfig> {
        self.state
            .lock()
            .await
            .servers
            .iter()
            .filter(|s| s.is_enabled)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<ServerConfig> {
        self.state
            .lock()
            .await
            .servers
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn add(&self, config: ServerConfig) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.servers.iter().any(|s| s.id == config.id) {
            return Err(StoreError::Duplicate(config.id));
        }
        tracing::info!("Adding server {} ({}:{})", config.name, config.host, config.port);
        let mut next = state.clone();
        next.servers.push(config);
        self.commit(&mut state, next).await
    }

    /// Replace a record wholesale. Callers read, modify, then write back.
    pub async fn update(&self, config: ServerConfig) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let slot = next
            .servers
            .iter_mut()
            .find(|s| s.id == config.id)
            .ok_or(StoreError::NotFound(config.id))?;
        *slot = config;
        self.commit(&mut state, next).await
    }

    /// Remove a record. Clears the primary pointer (and the cached-tier
    /// memory) when they refer to it.
    pub async fn remove(&self, id: Uuid) -> Result<ServerConfig, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let index = next
            .servers
            .iter()
            .position(|s| s.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let removed = next.servers.remove(index);

        if next.primary == Some(id) {
            tracing::info!("Removed server {} was primary, clearing primary", id);
            next.primary = None;
        }
        let forget_cached = next
            .last_connected
            .as_ref()
            .is_some_and(|last| removed.same_endpoint(last.host(), last.port()));
        if forget_cached {
            next.last_connected = None;
        }

        self.commit(&mut state, next).await?;
        tracing::info!("Removed server {} ({})", removed.name, id);
        Ok(removed)
    }

    /// Include or exclude a server from health checks. The recorded health
    /// is left as the monitor last saw it.
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let server = next
            .servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound(id))?;
        server.is_enabled = enabled;
        tracing::debug!("Server {} enabled={}", id, enabled);
        self.commit(&mut state, next).await
    }

    pub async fn primary(&self) -> Option<ServerConfig> {
        let state = self.state.lock().await;
        let id = state.primary?;
        state.servers.iter().find(|s| s.id == id).cloned()
    }

    pub async fn set_primary(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.servers.iter().any(|s| s.id == id) {
            return Err(StoreError::NotFound(id));
        }
        let mut next = state.clone();
        next.primary = Some(id);
        self.commit(&mut state, next).await
    }

    /// Apply a liveness result to one record.
    ///
    /// Records removed while the check was in flight are skipped rather than
    /// resurrected.
    pub async fn record_health(&self, id: Uuid, update: HealthUpdate) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let Some(server) = next.servers.iter_mut().find(|s| s.id == id) else {
            tracing::debug!("Health result for removed server {} dropped", id);
            return Ok(());
        };
        server.health_status = update.status;
        if update.checked_at.is_some() {
            server.last_checked = update.checked_at;
            server.response_time_ms = update.response_time_ms;
            server.error_message = update.error_message;
        }
        self.commit(&mut state, next).await
    }

    /// Persist a discovery result: reuse the record with the same endpoint
    /// or create one, make it primary, and remember it for the cached tier.
    pub async fn remember_connection(
        &self,
        server: &DiscoveredServer,
    ) -> Result<ServerConfig, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let record = apply_connection(&mut next, server);
        self.commit(&mut state, next).await?;
        Ok(record)
    }

    /// Like [`remember_connection`](Self::remember_connection), but
    /// `still_current` is checked under the store lock and nothing is written
    /// when it returns false.
    pub async fn remember_connection_if<F>(
        &self,
        server: &DiscoveredServer,
        still_current: F,
    ) -> Result<Option<ServerConfig>, StoreError>
    where
        F: FnOnce() -> bool,
    {
        let mut state = self.state.lock().await;
        if !still_current() {
            tracing::debug!("Connection to {} superseded, not saving", server);
            return Ok(None);
        }
        let mut next = state.clone();
        let record = apply_connection(&mut next, server);
        self.commit(&mut state, next).await?;
        Ok(Some(record))
    }

    pub async fn last_connected(&self) -> Option<DiscoveredServer> {
        self.state.lock().await.last_connected.clone()
    }

    /// Write `next` to disk, then make it the live state. On a failed write
    /// the live state is left as it was.
    async fn commit(&self, state: &mut StoreState, next: StoreState) -> Result<(), StoreError> {
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(state).map_err(|source| StoreError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

/// Point `state` at `server`, reusing a record with the same endpoint.
fn apply_connection(state: &mut StoreState, server: &DiscoveredServer) -> ServerConfig {
    let existing = state
        .servers
        .iter()
        .position(|s| s.same_endpoint(server.host(), server.port()));
    let record = match existing {
        Some(index) => {
            let record = &mut state.servers[index];
            record.is_enabled = true;
            record.clone()
        }
        None => {
            let record = ServerConfig::from_discovered(server);
            tracing::info!("Saving newly discovered server {} as {}", server, record.id);
            state.servers.push(record.clone());
            record
        }
    };
    state.primary = Some(record.id);
    state.last_connected = Some(server.clone());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryMethod;
    use crate::store::ServerType;
    use tempfile::TempDir;

    fn gateway(host: &str) -> ServerConfig {
        ServerConfig::new("Gateway", host, 11400, ServerType::Gateway)
    }

    #[tokio::test]
    async fn test_add_list_get() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        let b = gateway("10.0.0.2");
        store.add(a.clone()).await.unwrap();
        store.add(b.clone()).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a.id);
        assert_eq!(listed[1].id, b.id);
        assert_eq!(store.get(b.id).await, Some(b));
    }

    #[tokio::test]
    async fn test_add_duplicate_id_rejected() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        store.add(a.clone()).await.unwrap();
        assert!(matches!(store.add(a).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_whole_record() {
        let store = ServerStore::in_memory();
        let mut a = gateway("10.0.0.1");
        store.add(a.clone()).await.unwrap();

        a.name = "Renamed".to_string();
        a.port = 9000;
        store.update(a.clone()).await.unwrap();
        assert_eq!(store.get(a.id).await, Some(a));
    }

    #[tokio::test]
    async fn test_update_unknown_fails() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        assert!(matches!(store.update(a).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_primary_clears_pointer() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        let b = gateway("10.0.0.2");
        store.add(a.clone()).await.unwrap();
        store.add(b.clone()).await.unwrap();
        store.set_primary(a.id).await.unwrap();
        assert_eq!(store.primary().await.map(|s| s.id), Some(a.id));

        store.remove(a.id).await.unwrap();
        assert!(store.primary().await.is_none());
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_other_keeps_pointer() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        let b = gateway("10.0.0.2");
        store.add(a.clone()).await.unwrap();
        store.add(b.clone()).await.unwrap();
        store.set_primary(a.id).await.unwrap();

        store.remove(b.id).await.unwrap();
        assert_eq!(store.primary().await.map(|s| s.id), Some(a.id));
    }

    #[tokio::test]
    async fn test_set_enabled_filters_list() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        let b = gateway("10.0.0.2");
        store.add(a.clone()).await.unwrap();
        store.add(b.clone()).await.unwrap();

        store.set_enabled(a.id, false).await.unwrap();
        let enabled = store.list_enabled().await;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, b.id);
    }

    #[tokio::test]
    async fn test_disabling_keeps_recorded_health() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        store.add(a.clone()).await.unwrap();
        store
            .record_health(a.id, HealthUpdate::status_only(ServerHealthStatus::Healthy))
            .await
            .unwrap();

        store.set_enabled(a.id, false).await.unwrap();
        let a = store.get(a.id).await.unwrap();
        assert!(!a.is_enabled);
        assert_eq!(a.health_status, ServerHealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_superseded_connection_is_not_saved() {
        let store = ServerStore::in_memory();
        let current = DiscoveredServer::new("Current", "10.0.0.1", 11400, DiscoveryMethod::QrCode);
        store.remember_connection(&current).await.unwrap();

        let stale = DiscoveredServer::new("Stale", "10.0.0.2", 11400, DiscoveryMethod::SubnetScan);
        let saved = store.remember_connection_if(&stale, || false).await.unwrap();

        assert!(saved.is_none());
        assert_eq!(store.list().await.len(), 1);
        assert_eq!(store.primary().await.unwrap().host, "10.0.0.1");
        assert_eq!(store.last_connected().await, Some(current));
    }

    #[tokio::test]
    async fn test_record_health_for_removed_server_is_dropped() {
        let store = ServerStore::in_memory();
        let a = gateway("10.0.0.1");
        store.add(a.clone()).await.unwrap();
        store.remove(a.id).await.unwrap();

        store
            .record_health(a.id, HealthUpdate::status_only(ServerHealthStatus::Healthy))
            .await
            .unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_remember_connection_dedupes_by_endpoint() {
        let store = ServerStore::in_memory();
        let found = DiscoveredServer::new("Studio", "10.0.0.9", 11400, DiscoveryMethod::SubnetScan);

        let first = store.remember_connection(&found).await.unwrap();
        let again = DiscoveredServer::new("Studio", "10.0.0.9", 11400, DiscoveryMethod::Cached);
        let second = store.remember_connection(&again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list().await.len(), 1);
        assert_eq!(store.primary().await.map(|s| s.id), Some(first.id));
        assert_eq!(store.last_connected().await, Some(again));
    }

    #[tokio::test]
    async fn test_remove_forgets_cached_server() {
        let store = ServerStore::in_memory();
        let found = DiscoveredServer::new("Studio", "10.0.0.9", 11400, DiscoveryMethod::QrCode);
        let record = store.remember_connection(&found).await.unwrap();

        store.remove(record.id).await.unwrap();
        assert!(store.last_connected().await.is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("servers.json");

        let id = {
            let store = ServerStore::open(&path).unwrap();
            let a = gateway("10.0.0.1");
            store.add(a.clone()).await.unwrap();
            store.set_primary(a.id).await.unwrap();
            a.id
        };

        let reopened = ServerStore::open(&path).unwrap();
        assert_eq!(reopened.list().await.len(), 1);
        assert_eq!(reopened.primary().await.map(|s| s.id), Some(id));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ServerStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("servers.json");
        let store = ServerStore::open(&saved).unwrap();
        let kept = gateway("10.0.0.1");
        store.add(kept.clone()).await.unwrap();
        store.set_primary(kept.id).await.unwrap();

        // Turn the store's directory entry into something unwritable
        std::fs::remove_file(&saved).unwrap();
        std::fs::create_dir(&saved).unwrap();

        let extra = gateway("10.0.0.2");
        assert!(matches!(
            store.add(extra.clone()).await,
            Err(StoreError::Io { .. })
        ));
        assert!(matches!(
            store.remove(kept.id).await,
            Err(StoreError::Io { .. })
        ));
        assert!(store.set_enabled(kept.id, false).await.is_err());

        let servers = store.list().await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id, kept.id);
        assert!(servers[0].is_enabled);
        assert_eq!(store.primary().await.map(|s| s.id), Some(kept.id));
    }

    #[tokio::test]
    async fn test_unwritable_parent_rejects_add() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let store = ServerStore::open(blocker.join("servers.json")).unwrap();

        assert!(store.add(gateway("10.0.0.1")).await.is_err());
        assert!(store.list().await.is_empty());
    }
}
