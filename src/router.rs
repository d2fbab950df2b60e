//! Dispatch orchestrator: maps a classification label to the pipelines to
//! invoke, runs them sequentially, and reports progress to an observer.

use tracing::{info, warn};

use crate::classify::ClassificationLabel;
use crate::error::BioQueryError;
use crate::pipelines::QueryPipeline;
use crate::transform::record::RawResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    ClinicalTrials,
    DrugTarget,
}

/// The dispatch decision for one label: which pipelines run, in order, the
/// label the decision resolves to, and a note when fallback was engaged.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub pipelines: Vec<PipelineKind>,
    pub resolution: ClassificationLabel,
    pub fallback_note: Option<String>,
}

/// Total over the label set. `None` and `Unknown` fall back to broad
/// coverage: both pipelines, clinical trials first.
pub fn dispatch_plan(label: ClassificationLabel) -> DispatchPlan {
    match label {
        ClassificationLabel::ClinicalTrials => DispatchPlan {
            pipelines: vec![PipelineKind::ClinicalTrials],
            resolution: label,
            fallback_note: None,
        },
        ClassificationLabel::OpenTargets => DispatchPlan {
            pipelines: vec![PipelineKind::DrugTarget],
            resolution: label,
            fallback_note: None,
        },
        ClassificationLabel::Both => DispatchPlan {
            pipelines: vec![PipelineKind::ClinicalTrials, PipelineKind::DrugTarget],
            resolution: label,
            fallback_note: None,
        },
        ClassificationLabel::None | ClassificationLabel::Unknown => DispatchPlan {
            pipelines: vec![PipelineKind::ClinicalTrials, PipelineKind::DrugTarget],
            resolution: ClassificationLabel::Both,
            fallback_note: Some("Fallback executed to cover both pipelines.".to_string()),
        },
    }
}

/// Ordered progress sink for long-running queries. Observer failures must not
/// abort the run; they are logged and ignored.
pub trait ProgressObserver: Send {
    fn notify(&mut self, percent: u8, stage: &str) -> anyhow::Result<()>;
}

pub(crate) fn notify(observer: &mut Option<&mut dyn ProgressObserver>, percent: u8, stage: &str) {
    if let Some(obs) = observer.as_mut()
        && let Err(err) = obs.notify(percent, stage)
    {
        warn!(percent, stage, error = %err, "Progress observer failed");
    }
}

pub struct QueryRouter<'a> {
    pub trials: &'a dyn QueryPipeline,
    pub targets: &'a dyn QueryPipeline,
}

impl QueryRouter<'_> {
    fn pipeline(&self, kind: PipelineKind) -> &dyn QueryPipeline {
        match kind {
            PipelineKind::ClinicalTrials => self.trials,
            PipelineKind::DrugTarget => self.targets,
        }
    }

    /// Runs the plan's pipelines one after another, in plan order. The second
    /// pipeline does not start until the first returns.
    pub async fn route_and_query(
        &self,
        query: &str,
        plan: &DispatchPlan,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) -> Result<Vec<RawResult>, BioQueryError> {
        let mut results = Vec::with_capacity(plan.pipelines.len());
        let fallback = plan.fallback_note.is_some();

        for (idx, kind) in plan.pipelines.iter().enumerate() {
            let pipeline = self.pipeline(*kind);
            let percent = match (plan.pipelines.len(), idx) {
                (1, _) => 45,
                (_, 0) => 40,
                _ => 65,
            };
            let stage = if fallback {
                format!("Running {} pipeline (fallback)", pipeline.name())
            } else {
                format!("Running {} pipeline", pipeline.name())
            };
            notify(&mut observer, percent, &stage);
            info!(pipeline = pipeline.name(), "Invoking pipeline");

            results.push(pipeline.run(query).await?);
        }

        notify(&mut observer, 85, "Aggregating results");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Mutex;

    struct RecordingPipeline {
        name: &'static str,
        log: &'static Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl QueryPipeline for RecordingPipeline {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _query: &str) -> Result<RawResult, BioQueryError> {
            self.log.lock().unwrap().push(self.name);
            Ok(RawResult::Mapping(Map::new()))
        }
    }

    fn router_with_log(
        log: &'static Mutex<Vec<&'static str>>,
    ) -> (RecordingPipeline, RecordingPipeline) {
        (
            RecordingPipeline {
                name: "ClinicalTrials.gov",
                log,
            },
            RecordingPipeline {
                name: "Open Targets",
                log,
            },
        )
    }

    #[test]
    fn single_label_plans_invoke_one_pipeline() {
        let plan = dispatch_plan(ClassificationLabel::ClinicalTrials);
        assert_eq!(plan.pipelines, vec![PipelineKind::ClinicalTrials]);
        assert!(plan.fallback_note.is_none());

        let plan = dispatch_plan(ClassificationLabel::OpenTargets);
        assert_eq!(plan.pipelines, vec![PipelineKind::DrugTarget]);
    }

    #[test]
    fn both_and_fallback_labels_plan_two_pipelines_in_order() {
        for label in [
            ClassificationLabel::Both,
            ClassificationLabel::None,
            ClassificationLabel::Unknown,
        ] {
            let plan = dispatch_plan(label);
            assert_eq!(
                plan.pipelines,
                vec![PipelineKind::ClinicalTrials, PipelineKind::DrugTarget],
                "label {label:?}"
            );
            assert_eq!(plan.resolution, ClassificationLabel::Both);
        }
        assert!(dispatch_plan(ClassificationLabel::Both).fallback_note.is_none());
        assert!(dispatch_plan(ClassificationLabel::None).fallback_note.is_some());
        assert!(dispatch_plan(ClassificationLabel::Unknown).fallback_note.is_some());
    }

    #[tokio::test]
    async fn both_runs_clinical_trials_before_drug_target() {
        static LOG: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
        let (trials, targets) = router_with_log(&LOG);
        let router = QueryRouter {
            trials: &trials,
            targets: &targets,
        };

        let plan = dispatch_plan(ClassificationLabel::Both);
        let results = router.route_and_query("q", &plan, None).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(
            LOG.lock().unwrap().as_slice(),
            ["ClinicalTrials.gov", "Open Targets"]
        );
    }

    #[tokio::test]
    async fn failing_observer_does_not_abort_the_run() {
        struct FailingObserver {
            calls: Vec<(u8, String)>,
        }
        impl ProgressObserver for FailingObserver {
            fn notify(&mut self, percent: u8, stage: &str) -> anyhow::Result<()> {
                self.calls.push((percent, stage.to_string()));
                anyhow::bail!("observer is broken")
            }
        }

        static LOG: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
        let (trials, targets) = router_with_log(&LOG);
        let router = QueryRouter {
            trials: &trials,
            targets: &targets,
        };

        let mut observer = FailingObserver { calls: Vec::new() };
        let plan = dispatch_plan(ClassificationLabel::None);
        let results = router
            .route_and_query("q", &plan, Some(&mut observer))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        // Stage notifications were still emitted, in order, with the
        // fallback marker.
        assert_eq!(observer.calls.len(), 3);
        assert_eq!(observer.calls[0].0, 40);
        assert!(observer.calls[0].1.contains("(fallback)"));
        assert_eq!(observer.calls[1].0, 65);
        assert_eq!(observer.calls[2], (85, "Aggregating results".to_string()));
    }

    #[tokio::test]
    async fn pipeline_errors_propagate() {
        struct FailingPipeline;

        #[async_trait]
        impl QueryPipeline for FailingPipeline {
            fn name(&self) -> &'static str {
                "Open Targets"
            }
            async fn run(&self, _query: &str) -> Result<RawResult, BioQueryError> {
                Err(BioQueryError::ParseFailure {
                    context: "entity extraction".into(),
                    raw_excerpt: "gibberish".into(),
                })
            }
        }

        static LOG: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
        let (trials, _) = router_with_log(&LOG);
        let failing = FailingPipeline;
        let router = QueryRouter {
            trials: &trials,
            targets: &failing,
        };

        let plan = dispatch_plan(ClassificationLabel::OpenTargets);
        let err = router.route_and_query("q", &plan, None).await.unwrap_err();
        assert!(matches!(err, BioQueryError::ParseFailure { .. }));
    }
}
