//! Query classification: free text → topical intent label.
//!
//! The classifier is an opaque oracle; anything it returns outside the fixed
//! label set degrades to [`ClassificationLabel::Unknown`] and never fails.

use tracing::warn;

use crate::extract::TextOracle;

const ROUTER_PROMPT: &str = r#"You are an assistant that decides whether a biomedical query is about:

- clinical trials
- drug/target data
- both
- none

Respond ONLY with one of these exact options:
- clinical_trials
- open_targets
- both
- none

Do NOT explain. Just return one of the options exactly as listed.

Query: {query}
Answer:
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationLabel {
    ClinicalTrials,
    OpenTargets,
    Both,
    None,
    Unknown,
}

impl ClassificationLabel {
    /// Total parse: any string outside the fixed label set maps to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "clinical_trials" => Self::ClinicalTrials,
            "open_targets" => Self::OpenTargets,
            "both" => Self::Both,
            "none" => Self::None,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClinicalTrials => "clinical_trials",
            Self::OpenTargets => "open_targets",
            Self::Both => "both",
            Self::None => "none",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub label: ClassificationLabel,
    pub rationale: String,
}

/// Classifies a query via the oracle. Oracle errors and unrecognized labels
/// both degrade to `Unknown` so the caller's fallback dispatch engages.
pub async fn classify_query(oracle: &dyn TextOracle, query: &str) -> Classification {
    let prompt = ROUTER_PROMPT.replace("{query}", query);

    match oracle.complete(&prompt).await {
        Ok(response) => {
            let label = ClassificationLabel::parse(&response);
            let rationale = if label == ClassificationLabel::Unknown {
                format!(
                    "Router returned unexpected label '{}'. Falling back to broad coverage.",
                    response.trim()
                )
            } else {
                format!("Router classified query as '{label}'.")
            };
            Classification { label, rationale }
        }
        Err(err) => {
            warn!(error = %err, "Query classification failed");
            Classification {
                label: ClassificationLabel::Unknown,
                rationale: format!("Router error: {err}. Fallback engaged."),
            }
        }
    }
}
