// Error taxonomy shared by the discovery, probing and storage components.
//
// Lower-level failures (reqwest, io, mdns) are folded into one of these
// categories before they reach visible state, so callers never see a raw
// transport error string.

use thiserror::Error;

/// Outcome categories for anything that talks to the network on behalf of
/// discovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// A tier looked and found nothing. Drives fallback to the next tier.
    #[error("no server found")]
    NotFound,

    /// Timeout, refused connection, unreachable network.
    #[error("network unavailable: {0}")]
    Transient(String),

    /// Bad QR payload, bad manual host or port.
    #[error("invalid input: {0}")]
    MalformedInput(String),

    /// A host answered but the answer made no sense.
    #[error("unexpected response from {host}: {detail}")]
    Protocol { host: String, detail: String },

    /// Every tier was tried and none produced a server.
    #[error("no server found on the local network; manual setup required")]
    Exhausted,

    /// The session was cancelled or superseded before it finished.
    #[error("discovery cancelled")]
    Cancelled,
}

impl DiscoveryError {
    /// Whether a tier failing with this error should fall through to the next
    /// tier rather than abort the session.
    pub fn is_fallthrough(&self) -> bool {
        matches!(self, DiscoveryError::NotFound | DiscoveryError::Transient(_))
    }

    pub fn protocol(host: impl Into<String>, detail: impl Into<String>) -> Self {
        DiscoveryError::Protocol {
            host: host.into(),
            detail: detail.into(),
        }
    }

    /// Classify a reqwest failure against `host`.
    ///
    /// Connect and timeout failures are transient. Anything else means we
    /// reached something that did not speak HTTP the way we expected.
    pub fn from_http(host: &str, err: &reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            DiscoveryError::Transient(format!("{} did not answer", host))
        } else if caused_by_io(err) {
            // resets and broken pipes surface as request errors with an io cause
            DiscoveryError::Transient(format!("{} dropped the connection", host))
        } else {
            DiscoveryError::protocol(host, "response was not valid HTTP")
        }
    }
}

fn caused_by_io(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Failures of the persisted server list.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("server {0} not found")]
    NotFound(uuid::Uuid),

    #[error("server {0} already exists")]
    Duplicate(uuid::Uuid),

    #[error("failed to read or write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server list at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallthrough_categories() {
        assert!(DiscoveryError::NotFound.is_fallthrough());
        assert!(DiscoveryError::Transient("timeout".to_string()).is_fallthrough());
        assert!(!DiscoveryError::protocol("10.0.0.2", "garbage").is_fallthrough());
        assert!(!DiscoveryError::MalformedInput("port".to_string()).is_fallthrough());
        assert!(!DiscoveryError::Cancelled.is_fallthrough());
    }

    #[test]
    fn test_protocol_message_names_host() {
        let err = DiscoveryError::protocol("10.0.0.2", "response was not valid HTTP");
        assert_eq!(
            err.to_string(),
            "unexpected response from 10.0.0.2: response was not valid HTTP"
        );
    }
}
