// Out-of-band server entry: QR payloads and hand-typed host/port.
//
// Both are validated here, at the boundary. Nothing malformed ever reaches
// the discovery state machine.

use reqwest::Url;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("no host given")]
    MissingHost,

    #[error("no port given")]
    MissingPort,

    #[error("'{0}' is not a valid host")]
    InvalidHost(String),

    #[error("'{0}' is not a valid port (1-65535)")]
    InvalidPort(String),
}

/// A validated host/port pair, plus an optional display name from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub name: Option<String>,
}

/// Parse a scanned QR payload.
///
/// Accepted shapes:
/// - JSON object: `{"host": "192.168.1.10", "port": 11400}`
/// - key/value pairs: `host=192.168.1.10;port=11400` (`;`, `&`, `,` or newlines)
/// - URL: `http://192.168.1.10:11400`
pub fn parse_qr_payload(payload: &str) -> Result<Endpoint, EntryError> {
    let payload = payload.trim();

    if payload.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) {
            return endpoint_from_json(&value);
        }
    }

    if payload.contains("://") {
        if let Some(endpoint) = endpoint_from_url(payload) {
            return Ok(endpoint);
        }
    }

    endpoint_from_pairs(payload)
}

/// Validate a hand-typed host and port.
pub fn parse_manual(host: &str, port: &str) -> Result<Endpoint, EntryError> {
    Ok(Endpoint {
        host: validate_host(host)?,
        port: parse_port(port)?,
        name: None,
    })
}

/// Parse a port typed or scanned as text.
pub fn parse_port(raw: &str) -> Result<u16, EntryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EntryError::MissingPort);
    }
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(EntryError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

/// Accept an IP literal or something that could resolve as a name.
pub fn validate_host(raw: &str) -> Result<String, EntryError> {
    let host = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(EntryError::MissingHost);
    }
    if host.parse::<IpAddr>().is_ok() {
        return Ok(host.to_string());
    }
    let valid_name = host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid_name {
        Ok(host.to_string())
    } else {
        Err(EntryError::InvalidHost(raw.trim().to_string()))
    }
}

/// Split `key=value` pairs. Shared with the peer beacon reply format.
pub(crate) fn key_values(text: &str) -> impl Iterator<Item = (String, &str)> {
    text.split(|c| matches!(c, ';' | '&' | ',' | '\n'))
        .filter_map(|pair| pair.split_once(['=', ':']))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim()))
}

pub(crate) fn endpoint_from_pairs(text: &str) -> Result<Endpoint, EntryError> {
    let mut host = None;
    let mut port = None;
    let mut name = None;

    for (key, value) in key_values(text) {
        match key.as_str() {
            "host" => host = Some(value),
            "port" => port = Some(value),
            "name" => name = Some(value.to_string()),
            _ => {}
        }
    }

    let host = host.ok_or(EntryError::MissingHost)?;
    let port = port.ok_or(EntryError::MissingPort)?;
    Ok(Endpoint {
        host: validate_host(host)?,
        port: parse_port(port)?,
        name: name.filter(|n| !n.is_empty()),
    })
}

fn endpoint_from_json(value: &serde_json::Value) -> Result<Endpoint, EntryError> {
    let host = value
        .get("host")
        .and_then(|h| h.as_str())
        .ok_or(EntryError::MissingHost)?;
    let port = match value.get("port") {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => return Err(EntryError::InvalidPort(other.to_string())),
        None => return Err(EntryError::MissingPort),
    };
    let name = value
        .get("name")
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(Endpoint {
        host: validate_host(host)?,
        port: parse_port(&port)?,
        name,
    })
}

fn endpoint_from_url(text: &str) -> Option<Endpoint> {
    let url = Url::parse(text).ok()?;
    let host = url.host_str()?;
    // A URL without an explicit port has not told us where the server is.
    let port = url.port()?;
    Some(Endpoint {
        host: validate_host(host).ok()?,
        port,
        name: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimited_payload() {
        let endpoint = parse_qr_payload("host=192.168.1.10;port=11400").unwrap();
        assert_eq!(endpoint.host, "192.168.1.10");
        assert_eq!(endpoint.port, 11400);
        assert!(endpoint.name.is_none());
    }

    #[test]
    fn test_json_payload_with_name() {
        let endpoint =
            parse_qr_payload(r#"{"host": "studio.local", "port": "11400", "name": "Studio"}"#)
                .unwrap();
        assert_eq!(endpoint.host, "studio.local");
        assert_eq!(endpoint.port, 11400);
        assert_eq!(endpoint.name.as_deref(), Some("Studio"));
    }

    #[test]
    fn test_url_payload() {
        let endpoint = parse_qr_payload("http://10.1.2.3:8766/setup").unwrap();
        assert_eq!(endpoint.host, "10.1.2.3");
        assert_eq!(endpoint.port, 8766);
    }

    #[test]
    fn test_url_without_port_is_rejected() {
        assert!(parse_qr_payload("https://example.com/menu").is_err());
    }

    #[test]
    fn test_unrelated_text_is_rejected() {
        assert_eq!(parse_qr_payload("hello world"), Err(EntryError::MissingHost));
    }

    #[test]
    fn test_missing_port_is_rejected() {
        assert_eq!(
            parse_qr_payload("host=192.168.1.10"),
            Err(EntryError::MissingPort)
        );
        assert_eq!(
            parse_qr_payload(r#"{"host": "192.168.1.10"}"#),
            Err(EntryError::MissingPort)
        );
    }

    #[test]
    fn test_port_bounds() {
        assert_eq!(parse_port("11400"), Ok(11400));
        assert_eq!(parse_port(" 80 "), Ok(80));
        assert!(matches!(parse_port("0"), Err(EntryError::InvalidPort(_))));
        assert!(matches!(parse_port("70000"), Err(EntryError::InvalidPort(_))));
        assert!(matches!(parse_port("abc"), Err(EntryError::InvalidPort(_))));
        assert_eq!(parse_port(""), Err(EntryError::MissingPort));
    }

    #[test]
    fn test_host_validation() {
        assert_eq!(validate_host("192.168.1.10").unwrap(), "192.168.1.10");
        assert_eq!(validate_host("[fe80::1]").unwrap(), "fe80::1");
        assert_eq!(validate_host("gateway.local").unwrap(), "gateway.local");
        assert_eq!(validate_host("  "), Err(EntryError::MissingHost));
        assert!(validate_host("bad host").is_err());
        assert!(validate_host("-leading.example").is_err());
    }

    #[test]
    fn test_manual_entry() {
        let endpoint = parse_manual("10.0.0.7", "11400").unwrap();
        assert_eq!(endpoint.host, "10.0.0.7");
        assert_eq!(endpoint.port, 11400);
        assert!(parse_manual("10.0.0.7", "port").is_err());
    }
}
