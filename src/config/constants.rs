// Project-wide constants
//
// Centralised here so port numbers and other magic values have one
// source of truth. Import via `use crate::config::constants::*;`.

/// mDNS service type advertised by the companion server.
pub const SERVICE_TYPE: &str = "_lanlink._tcp.local.";

/// Default port of the gateway, the primary connection target.
///
/// This is also the port offered when a user types a host without one.
pub const DEFAULT_GATEWAY_PORT: u16 = 11400;

/// Management / orchestration API. Reports capability across services.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 8766;

/// Ollama model runtime.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Whisper speech-to-text.
pub const DEFAULT_WHISPER_PORT: u16 = 11401;

/// Piper text-to-speech.
pub const DEFAULT_PIPER_PORT: u16 = 11402;

/// VibeVoice text-to-speech.
pub const DEFAULT_VIBEVOICE_PORT: u16 = 8880;

/// UDP port the peer beacon listens on.
pub const DEFAULT_BEACON_PORT: u16 = 11403;

/// Datagram a client broadcasts to ask peers for an address.
pub const BEACON_QUERY: &[u8] = b"LANLINK_DISCOVER";

/// Path every backend family is expected to answer when nothing more specific
/// is known.
pub const GENERIC_HEALTH_PATH: &str = "/health";

/// Directory under $HOME holding config and state.
pub const APP_DIR: &str = ".lanlink";
