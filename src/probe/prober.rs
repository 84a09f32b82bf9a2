// Capability prober.
//
// Two attempts, in order, never in parallel:
//   1. management API: GET /health, then GET /api/models
//   2. model runtime:  GET /api/version, then GET /api/tags
// Each attempt (contact + listing) runs under its own budget, so a call never
// takes longer than the two budgets combined. Nothing is retried within a call.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::capabilities::{parse_voice_list, ServerCapabilities};
use crate::config::constants::{DEFAULT_PIPER_PORT, GENERIC_HEALTH_PATH};
use crate::config::ProbeConfig;
use crate::errors::DiscoveryError;
use crate::network;

pub struct CapabilityProber {
    client: Client,
    config: ProbeConfig,
}

impl CapabilityProber {
    pub fn new(client: Client, config: ProbeConfig) -> Self {
        Self { client, config }
    }

    /// Learn what `host` exposes.
    ///
    /// Never fails: a host with nothing on it yields
    /// [`ServerCapabilities::none`].
    pub async fn probe(&self, host: &str) -> ServerCapabilities {
        match self.try_management(host).await {
            Ok(caps) => {
                tracing::info!("Capabilities of {} from management API: {}", host, caps.summary);
                return caps;
            }
            Err(e) => tracing::debug!("Management API probe of {} failed: {}", host, e),
        }

        match self.try_runtime(host).await {
            Ok(caps) => {
                tracing::info!("Capabilities of {} from model runtime: {}", host, caps.summary);
                caps
            }
            Err(e) => {
                tracing::debug!("Model runtime probe of {} failed: {}", host, e);
                ServerCapabilities::none()
            }
        }
    }

    /// List the voices a TTS server offers on `port` (Piper by default).
    pub async fn probe_voices(&self, host: &str, port: Option<u16>) -> Vec<String> {
        let port = port.unwrap_or(DEFAULT_PIPER_PORT);
        let budget = self.config.runtime_timeout();
        match self.get_json(host, port, "/voices", budget).await {
            Ok(body) => parse_voice_list(&body),
            Err(e) => {
                tracing::debug!("Voice listing on {}:{} failed: {}", host, port, e);
                Vec::new()
            }
        }
    }

    async fn try_management(&self, host: &str) -> Result<ServerCapabilities, DiscoveryError> {
        let port = self.config.management_port;
        let budget = self.config.management_timeout();
        let attempt = async {
            self.contact(host, port, GENERIC_HEALTH_PATH, budget).await?;
            let models = self.get_json(host, port, "/api/models", budget).await;
            Ok::<_, DiscoveryError>(match models {
                Ok(body) => ServerCapabilities::from_management_models(&body),
                // Reachable but the listing is unusable: report an empty set from this surface.
                Err(_) => ServerCapabilities::from_management_models(&Value::Null),
            })
        };
        within(host, budget, attempt).await
    }

    async fn try_runtime(&self, host: &str) -> Result<ServerCapabilities, DiscoveryError> {
        let port = self.config.runtime_port;
        let budget = self.config.runtime_timeout();
        let attempt = async {
            self.contact(host, port, "/api/version", budget).await?;
            let tags = self.get_json(host, port, "/api/tags", budget).await;
            Ok::<_, DiscoveryError>(match tags {
                Ok(body) => ServerCapabilities::from_runtime_tags(&body),
                Err(_) => ServerCapabilities::from_runtime_tags(&Value::Null),
            })
        };
        within(host, budget, attempt).await
    }

    async fn contact(
        &self,
        host: &str,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> Result<(), DiscoveryError> {
        let status = network::get_status(&self.client, host, port, path, timeout).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(DiscoveryError::NotFound)
        }
    }

    async fn get_json(
        &self,
        host: &str,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> Result<Value, DiscoveryError> {
        let url = format!("{}{}", network::base_url(host, port), path);
        let resp = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DiscoveryError::from_http(host, &e))?;
        if !resp.status().is_success() {
            return Err(DiscoveryError::NotFound);
        }
        resp.json::<Value>()
            .await
            .map_err(|_| DiscoveryError::protocol(host, format!("{} did not return JSON", path)))
    }
}

async fn within<F>(host: &str, budget: Duration, attempt: F) -> Result<ServerCapabilities, DiscoveryError>
where
    F: std::future::Future<Output = Result<ServerCapabilities, DiscoveryError>>,
{
    tokio::time::timeout(budget, attempt)
        .await
        .unwrap_or_else(|_| Err(DiscoveryError::Transient(format!("{} timed out", host))))
}
