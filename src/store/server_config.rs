// Persisted server records and their health classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::constants::*;
use crate::discovery::{DiscoveredServer, DiscoveryMethod};

/// Backend family. Decides which path the liveness probe hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    Gateway,
    Management,
    Ollama,
    Whisper,
    Piper,
    VibeVoice,
    Generic,
}

impl ServerType {
    /// Liveness path this family answers.
    pub fn health_path(&self) -> &'static str {
        match self {
            ServerType::Ollama => "/api/tags",
            ServerType::Piper => "/voices",
            ServerType::Gateway
            | ServerType::Management
            | ServerType::Whisper
            | ServerType::VibeVoice
            | ServerType::Generic => GENERIC_HEALTH_PATH,
        }
    }

    /// Conventional port, if the family has one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            ServerType::Gateway => Some(DEFAULT_GATEWAY_PORT),
            ServerType::Management => Some(DEFAULT_MANAGEMENT_PORT),
            ServerType::Ollama => Some(DEFAULT_OLLAMA_PORT),
            ServerType::Whisper => Some(DEFAULT_WHISPER_PORT),
            ServerType::Piper => Some(DEFAULT_PIPER_PORT),
            ServerType::VibeVoice => Some(DEFAULT_VIBEVOICE_PORT),
            ServerType::Generic => None,
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerType::Gateway => "gateway",
            ServerType::Management => "management",
            ServerType::Ollama => "ollama",
            ServerType::Whisper => "whisper",
            ServerType::Piper => "piper",
            ServerType::VibeVoice => "vibevoice",
            ServerType::Generic => "generic",
        };
        f.pad(label)
    }
}

/// Health classification, ordered by usability.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ServerHealthStatus {
    #[default]
    Unknown,
    Checking,
    Unhealthy,
    Degraded,
    Healthy,
}

impl ServerHealthStatus {
    /// `Healthy` and `Degraded` servers may still be used.
    pub fn is_usable(&self) -> bool {
        matches!(self, ServerHealthStatus::Healthy | ServerHealthStatus::Degraded)
    }
}

impl fmt::Display for ServerHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerHealthStatus::Unknown => "unknown",
            ServerHealthStatus::Checking => "checking",
            ServerHealthStatus::Unhealthy => "unhealthy",
            ServerHealthStatus::Degraded => "degraded",
            ServerHealthStatus::Healthy => "healthy",
        };
        f.pad(label)
    }
}

/// A known server. Owned by the store; everyone else works on copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub server_type: ServerType,
    pub is_enabled: bool,
    #[serde(default)]
    pub health_status: ServerHealthStatus,
    /// How the server was first found
    #[serde(default)]
    pub discovery_method: Option<DiscoveryMethod>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    /// Reason given by the last failed or degraded check
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, server_type: ServerType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.into(),
            port,
            server_type,
            is_enabled: true,
            health_status: ServerHealthStatus::Unknown,
            discovery_method: None,
            last_checked: None,
            response_time_ms: None,
            error_message: None,
        }
    }

    /// Record for a freshly discovered gateway.
    pub fn from_discovered(server: &DiscoveredServer) -> Self {
        let mut config = Self::new(
            server.name(),
            server.host(),
            server.port(),
            ServerType::Gateway,
        );
        config.discovery_method = Some(server.discovery_method());
        config
    }

    pub fn same_endpoint(&self, host: &str, port: u16) -> bool {
        self.port == port && self.host.eq_ignore_ascii_case(host)
    }

    pub fn base_url(&self) -> String {
        crate::network::base_url(&self.host, self.port)
    }

    /// Short display prefix (first 8 chars of UUID)
    pub fn short_id(&self) -> String {
        self.id.simple().to_string().chars().take(8).collect()
    }
}
