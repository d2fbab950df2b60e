//! Trial filter extraction: structured search fields from a free-text query.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::extract::{TextOracle, decode_json_flex};

const FILTER_PROMPT: &str = r#"Extract the following information from the user query.
If not present, return null for that field.
Output JSON ONLY, no commentary.

Fields:
- Condition/Disease
- Intervention/Treatment/Drug
- Location
- Status
- Phase

Sentence: "{sentence}"
JSON:
"#;

/// Structured filter fields for a ClinicalTrials.gov search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrialFilters {
    pub condition: Option<String>,
    pub intervention: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub phase: Option<String>,
}

fn phase_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)phase\s*(?:(?P<num>[1-4])|(?P<roman>i{1,3}|iv))\b").expect("valid regex")
    })
}

/// Extracts a canonical `Phase N` token from free text. Users write variants
/// like `phase 2` or `Phase II`; no match returns `None` so the search can
/// stay broad.
pub fn extract_phase(query: &str) -> Option<String> {
    let caps = phase_regex().captures(query)?;

    let number = if let Some(num) = caps.name("num") {
        num.as_str().to_string()
    } else {
        match caps.name("roman")?.as_str().to_ascii_lowercase().as_str() {
            "i" => "1",
            "ii" => "2",
            "iii" => "3",
            "iv" => "4",
            _ => return None,
        }
        .to_string()
    };

    Some(format!("Phase {number}"))
}

fn field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Asks the oracle for structured filter fields. Extraction is best-effort:
/// an oracle or decode failure falls back to empty filters, and a phase hint
/// found in the raw query supplements a missing `Phase` field.
pub async fn extract_trial_filters(oracle: &dyn TextOracle, query: &str) -> TrialFilters {
    let prompt = FILTER_PROMPT.replace("{sentence}", query);

    let mut filters = match oracle.complete(&prompt).await {
        Ok(text) => match decode_json_flex("trial filters", &text) {
            Ok(parsed) => TrialFilters {
                condition: field(&parsed, "Condition/Disease"),
                intervention: field(&parsed, "Intervention/Treatment/Drug"),
                location: field(&parsed, "Location"),
                status: field(&parsed, "Status"),
                phase: field(&parsed, "Phase"),
            },
            Err(err) => {
                warn!(error = %err, "Trial filter output not parseable; using empty filters");
                TrialFilters::default()
            }
        },
        Err(err) => {
            warn!(error = %err, "Trial filter oracle failed; using empty filters");
            TrialFilters::default()
        }
    };

    if filters.phase.is_none() {
        filters.phase = extract_phase(query);
    }
    filters
}
