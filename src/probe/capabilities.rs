// Capability records and the defensive parsers that build them.
//
// Server responses are read as loose JSON. Anything missing or oddly shaped
// degrades to an empty list instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Which surface answered the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilitySource {
    /// Nothing answered
    #[default]
    None,
    /// Management / orchestration API
    Management,
    /// Language-model runtime contacted directly
    ModelRuntime,
}

/// What a host exposes. Recomputed on every probe and replaced wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub llm_models: Vec<String>,
    pub stt_models: Vec<String>,
    /// Voice names keyed by the TTS service offering them
    pub tts_voice_sets: BTreeMap<String, Vec<String>>,
    pub summary: String,
    pub source: CapabilitySource,
}

impl ServerCapabilities {
    /// Nothing found on the host.
    pub fn none() -> Self {
        Self::build(Vec::new(), Vec::new(), BTreeMap::new(), CapabilitySource::None)
    }

    fn build(
        llm_models: Vec<String>,
        stt_models: Vec<String>,
        tts_voice_sets: BTreeMap<String, Vec<String>>,
        source: CapabilitySource,
    ) -> Self {
        let summary = summarize(&llm_models, &stt_models, &tts_voice_sets);
        Self {
            llm_models,
            stt_models,
            tts_voice_sets,
            summary,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.llm_models.is_empty() && self.stt_models.is_empty() && self.tts_voice_sets.is_empty()
    }

    /// Parse the management API's model listing:
    /// `{"models": [{"name": .., "type": "llm"|"stt"|"tts", "server_name": ..}]}`
    pub fn from_management_models(body: &Value) -> Self {
        let mut llm = Vec::new();
        let mut stt = Vec::new();
        let mut voices: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for entry in array_at(body, "models") {
            let Some(name) = entry.get("name").and_then(Value::as_str).filter(|n| !n.is_empty())
            else {
                continue;
            };
            match entry.get("type").and_then(Value::as_str) {
                Some("llm") => push_unique(&mut llm, name),
                Some("stt") => push_unique(&mut stt, name),
                Some("tts") => {
                    let service = entry
                        .get("server_name")
                        .or_else(|| entry.get("server_id"))
                        .and_then(Value::as_str)
                        .unwrap_or("tts");
                    push_unique(voices.entry(service.to_string()).or_default(), name);
                }
                _ => {}
            }
        }

        Self::build(llm, stt, voices, CapabilitySource::Management)
    }

    /// Parse a model runtime's tag listing: `{"models": [{"name": ..}]}`
    pub fn from_runtime_tags(body: &Value) -> Self {
        let mut llm = Vec::new();
        for entry in array_at(body, "models") {
            if let Some(name) = entry
                .get("name")
                .or_else(|| entry.get("model"))
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
            {
                push_unique(&mut llm, name);
            }
        }
        Self::build(llm, Vec::new(), BTreeMap::new(), CapabilitySource::ModelRuntime)
    }
}

/// Extract voice names from a TTS voice listing.
///
/// Accepts `[..]`, `{"voices": [..]}` and `{"voices": {"voices": [..]}}`;
/// entries may be strings or objects carrying `name` or `id`.
pub fn parse_voice_list(body: &Value) -> Vec<String> {
    let mut list = body;
    while let Some(inner) = list.get("voices") {
        list = inner;
    }
    let mut names = Vec::new();
    for voice in list.as_array().map(Vec::as_slice).unwrap_or_default() {
        let name = match voice {
            Value::String(s) => Some(s.as_str()),
            Value::Object(_) => voice
                .get("name")
                .or_else(|| voice.get("id"))
                .and_then(Value::as_str),
            _ => None,
        };
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            push_unique(&mut names, name);
        }
    }
    names
}

fn array_at<'a>(body: &'a Value, key: &str) -> &'a [Value] {
    body.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn summarize(
    llm: &[String],
    stt: &[String],
    voices: &BTreeMap<String, Vec<String>>,
) -> String {
    let plural = |n: usize, one: &str, many: &str| {
        format!("{} {}", n, if n == 1 { one } else { many })
    };
    let mut parts = Vec::new();
    if !llm.is_empty() {
        parts.push(plural(llm.len(), "LLM model", "LLM models"));
    }
    if !stt.is_empty() {
        parts.push(plural(stt.len(), "STT model", "STT models"));
    }
    if !voices.is_empty() {
        parts.push(plural(voices.len(), "voice set", "voice sets"));
    }
    if parts.is_empty() {
        "no services detected".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_management_models_grouped_by_type() {
        let body = json!({
            "models": [
                {"name": "qwen2.5:7b", "type": "llm", "server_name": "Ollama LLM"},
                {"name": "llama3.2:3b", "type": "llm", "server_name": "Ollama LLM"},
                {"name": "Whisper", "type": "stt", "server_name": "Whisper STT"},
                {"name": "en_US-amy", "type": "tts", "server_name": "Piper TTS"},
                {"name": "en_GB-alan", "type": "tts", "server_name": "Piper TTS"},
                {"name": "VibeVoice-Realtime-0.5B", "type": "tts", "server_name": "VibeVoice TTS"}
            ],
            "total": 6
        });
        let caps = ServerCapabilities::from_management_models(&body);
        assert_eq!(caps.llm_models, vec!["qwen2.5:7b", "llama3.2:3b"]);
        assert_eq!(caps.stt_models, vec!["Whisper"]);
        assert_eq!(caps.tts_voice_sets.len(), 2);
        assert_eq!(caps.tts_voice_sets["Piper TTS"], vec!["en_US-amy", "en_GB-alan"]);
        assert_eq!(caps.summary, "2 LLM models, 1 STT model, 2 voice sets");
        assert_eq!(caps.source, CapabilitySource::Management);
    }

    #[test]
    fn test_malformed_management_body_is_empty() {
        for body in [
            json!({}),
            json!({"models": "nope"}),
            json!({"models": [42, {"type": "llm"}, {"name": "", "type": "llm"}]}),
            json!([1, 2, 3]),
        ] {
            let caps = ServerCapabilities::from_management_models(&body);
            assert!(caps.is_empty(), "expected empty for {}", body);
            assert_eq!(caps.summary, "no services detected");
        }
    }

    #[test]
    fn test_runtime_tags() {
        let body = json!({"models": [{"name": "qwen2.5:7b"}, {"model": "phi3"}, {"size": 1}]});
        let caps = ServerCapabilities::from_runtime_tags(&body);
        assert_eq!(caps.llm_models, vec!["qwen2.5:7b", "phi3"]);
        assert_eq!(caps.summary, "2 LLM models");
        assert_eq!(caps.source, CapabilitySource::ModelRuntime);
    }

    #[test]
    fn test_voice_list_shapes() {
        assert_eq!(parse_voice_list(&json!(["a", "b"])), vec!["a", "b"]);
        assert_eq!(parse_voice_list(&json!({"voices": ["a"]})), vec!["a"]);
        assert_eq!(
            parse_voice_list(&json!({"voices": {"voices": [{"name": "a"}, {"id": "b"}, 7]}})),
            vec!["a", "b"]
        );
        assert!(parse_voice_list(&json!({"voices": 3})).is_empty());
    }

    #[test]
    fn test_none_summary() {
        let caps = ServerCapabilities::none();
        assert!(caps.is_empty());
        assert_eq!(caps.source, CapabilitySource::None);
        assert_eq!(caps.summary, "no services detected");
    }
}
