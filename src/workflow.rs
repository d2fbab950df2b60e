//! End-to-end query execution: classification, dispatch, fetch, and
//! normalization, folded into one structured outcome.
//!
//! The outcome is always structured: failures set `error` and leave
//! `results` empty or partial, they never surface as a raw fault.

use std::sync::Arc;

use serde::Serialize;

use crate::classify::{Classification, classify_query};
use crate::error::BioQueryError;
use crate::extract::TextOracle;
use crate::pipelines::QueryPipeline;
use crate::pipelines::targets::TargetsPipeline;
use crate::pipelines::trials::TrialsPipeline;
use crate::router::{DispatchPlan, ProgressObserver, QueryRouter, dispatch_plan, notify};
use crate::sources::ollama::OllamaClient;
use crate::transform::canonical::normalize_results;
use crate::transform::record::CanonicalRecord;

#[derive(Debug, Serialize)]
pub struct QueryOutcome {
    pub classification: String,
    pub resolution: String,
    pub rationale: String,
    pub results: Vec<CanonicalRecord>,
    pub error: Option<String>,
}

impl QueryOutcome {
    fn unavailable(reason: &BioQueryError) -> Self {
        Self {
            classification: "unavailable".to_string(),
            resolution: "unavailable".to_string(),
            rationale: String::new(),
            results: Vec::new(),
            error: Some(format!("Query router unavailable: {reason}")),
        }
    }
}

/// Runs a query end to end with the production oracle and pipelines.
///
/// The whole call is one indivisible unit of work; callers that must not
/// block should move it onto a background task as a unit.
pub async fn run_query(
    query: &str,
    observer: Option<&mut dyn ProgressObserver>,
) -> QueryOutcome {
    let oracle: Arc<dyn TextOracle> = match OllamaClient::new() {
        Ok(client) => Arc::new(client),
        Err(err) => return QueryOutcome::unavailable(&err),
    };

    let trials = match TrialsPipeline::new(oracle.clone()) {
        Ok(pipeline) => pipeline,
        Err(err) => return QueryOutcome::unavailable(&err),
    };
    let targets = match TargetsPipeline::new(oracle.clone()) {
        Ok(pipeline) => pipeline,
        Err(err) => return QueryOutcome::unavailable(&err),
    };

    execute(oracle.as_ref(), &trials, &targets, query, observer).await
}

/// Core execution over injected collaborators. Split from [`run_query`] so
/// the control flow is testable without live services.
pub(crate) async fn execute(
    oracle: &dyn TextOracle,
    trials: &dyn QueryPipeline,
    targets: &dyn QueryPipeline,
    query: &str,
    mut observer: Option<&mut dyn ProgressObserver>,
) -> QueryOutcome {
    notify(&mut observer, 15, "Classifying query");
    let Classification { label, rationale } = classify_query(oracle, query).await;

    let plan: DispatchPlan = dispatch_plan(label);
    let rationale = match plan.fallback_note.as_deref() {
        Some(note) => format!("{rationale} {note}"),
        None => rationale,
    };

    let router = QueryRouter { trials, targets };
    let raw_results = match router.route_and_query(query, &plan, observer).await {
        Ok(results) => results,
        Err(err) => {
            return QueryOutcome {
                classification: label.to_string(),
                resolution: plan.resolution.to_string(),
                rationale,
                results: Vec::new(),
                error: Some(err.to_string()),
            };
        }
    };

    if raw_results.is_empty() {
        return QueryOutcome {
            classification: label.to_string(),
            resolution: plan.resolution.to_string(),
            rationale,
            results: Vec::new(),
            error: Some("No results returned for the supplied query.".to_string()),
        };
    }

    QueryOutcome {
        classification: label.to_string(),
        resolution: plan.resolution.to_string(),
        rationale,
        results: normalize_results(raw_results),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::record::{RawResult, TableMetadata, TabularRecord};
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct FixedOracle(&'static str);

    #[async_trait]
    impl TextOracle for FixedOracle {
        async fn complete(&self, _prompt: &str) -> Result<String, BioQueryError> {
            Ok(self.0.to_string())
        }
    }

    struct StubPipeline {
        name: &'static str,
        result: Result<(), ()>,
    }

    #[async_trait]
    impl QueryPipeline for StubPipeline {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _query: &str) -> Result<RawResult, BioQueryError> {
            match self.result {
                Ok(()) => {
                    let mut row = Map::new();
                    row.insert("title".to_string(), Value::String(self.name.to_string()));
                    Ok(RawResult::Table(TabularRecord {
                        rows: vec![row],
                        metadata: TableMetadata::for_source(self.name),
                    }))
                }
                Err(()) => Err(BioQueryError::ParseFailure {
                    context: "entity extraction".into(),
                    raw_excerpt: "gibberish".into(),
                }),
            }
        }
    }

    fn trials_stub() -> StubPipeline {
        StubPipeline {
            name: "ClinicalTrials.gov",
            result: Ok(()),
        }
    }

    fn targets_stub() -> StubPipeline {
        StubPipeline {
            name: "Open Targets",
            result: Ok(()),
        }
    }

    #[tokio::test]
    async fn clinical_trials_label_runs_one_pipeline() {
        let oracle = FixedOracle("clinical_trials");
        let outcome = execute(&oracle, &trials_stub(), &targets_stub(), "q", None).await;

        assert_eq!(outcome.classification, "clinical_trials");
        assert_eq!(outcome.resolution, "clinical_trials");
        assert!(outcome.error.is_none());
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].source, "ClinicalTrials.gov");
    }

    #[tokio::test]
    async fn unknown_label_falls_back_to_both_with_rationale() {
        let oracle = FixedOracle("no idea, sorry");
        let outcome = execute(&oracle, &trials_stub(), &targets_stub(), "q", None).await;

        assert_eq!(outcome.classification, "unknown");
        assert_eq!(outcome.resolution, "both");
        assert!(outcome.rationale.contains("Fallback executed"));
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].source, "ClinicalTrials.gov");
        assert_eq!(outcome.results[1].source, "Open Targets");
    }

    #[tokio::test]
    async fn pipeline_error_becomes_structured_outcome() {
        let oracle = FixedOracle("open_targets");
        let failing = StubPipeline {
            name: "Open Targets",
            result: Err(()),
        };
        let outcome = execute(&oracle, &trials_stub(), &failing, "q", None).await;

        assert_eq!(outcome.classification, "open_targets");
        assert!(outcome.results.is_empty());
        let error = outcome.error.expect("error should be set");
        assert!(error.contains("entity extraction"));
    }

    #[tokio::test]
    async fn observer_receives_classification_stage_first() {
        struct Recorder(Vec<(u8, String)>);
        impl ProgressObserver for Recorder {
            fn notify(&mut self, percent: u8, stage: &str) -> anyhow::Result<()> {
                self.0.push((percent, stage.to_string()));
                Ok(())
            }
        }

        let oracle = FixedOracle("both");
        let mut recorder = Recorder(Vec::new());
        let outcome = execute(
            &oracle,
            &trials_stub(),
            &targets_stub(),
            "q",
            Some(&mut recorder),
        )
        .await;

        assert!(outcome.error.is_none());
        let percents: Vec<u8> = recorder.0.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![15, 40, 65, 85]);
        assert_eq!(recorder.0[0].1, "Classifying query");
    }
}
