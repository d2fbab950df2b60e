//! Language-model output handling: the oracle seam and the strict two-stage
//! decode for "JSON, probably" completions.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BioQueryError;
use crate::sources::ollama::OllamaClient;

pub(crate) mod entities;
pub(crate) mod trials;

const EXCERPT_MAX_CHARS: usize = 160;

/// Free-text completion oracle. Hosted models sit behind this seam so the
/// extraction and classification logic is testable without a live model.
#[async_trait]
pub trait TextOracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BioQueryError>;
}

#[async_trait]
impl TextOracle for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, BioQueryError> {
        self.generate(prompt).await
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim().trim_matches('`').trim();
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("json") {
        trimmed[4..].trim()
    } else {
        trimmed
    }
}

fn blob_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_MAX_CHARS).collect();
    if text.chars().count() > EXCERPT_MAX_CHARS {
        out.push('…');
    }
    out
}

/// Decodes a model completion that should contain a JSON object.
///
/// Two stages: strict parse of the (fence-stripped) text, then a bounded scan
/// for an embedded `{...}` blob. Anything else is a typed failure, never a
/// silent null.
pub(crate) fn decode_json_flex(context: &str, text: &str) -> Result<Value, BioQueryError> {
    let candidate = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<Value>(candidate)
        && value.is_object()
    {
        return Ok(value);
    }

    if let Some(m) = blob_regex().find(candidate)
        && let Ok(value) = serde_json::from_str::<Value>(m.as_str())
        && value.is_object()
    {
        return Ok(value);
    }

    Err(BioQueryError::ParseFailure {
        context: context.to_string(),
        raw_excerpt: excerpt(text),
    })
}

/// Reads a JSON field that may be a list of strings, a bare string, or absent.
pub(crate) fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
