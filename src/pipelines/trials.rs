//! ClinicalTrials.gov pipeline: filter extraction, study fetch, and the
//! tabular result set handed to the normalization layer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::BioQueryError;
use crate::extract::TextOracle;
use crate::extract::trials::{TrialFilters, extract_trial_filters};
use crate::pipelines::QueryPipeline;
use crate::sources::clinicaltrials::{ClinicalTrialsClient, CtGovSearchParams, CtGovStudy};
use crate::transform::canonical::normalize_key;
use crate::transform::record::{RawResult, TableMetadata, TabularRecord};

const SOURCE_NAME: &str = "ClinicalTrials.gov";

pub struct TrialsPipeline {
    oracle: Arc<dyn TextOracle>,
    client: ClinicalTrialsClient,
}

impl TrialsPipeline {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Result<Self, BioQueryError> {
        Ok(Self {
            oracle,
            client: ClinicalTrialsClient::new()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(oracle: Arc<dyn TextOracle>, client: ClinicalTrialsClient) -> Self {
        Self { oracle, client }
    }

    fn metadata() -> TableMetadata {
        TableMetadata {
            source: Some(SOURCE_NAME.to_string()),
            title_fields: vec!["title".into(), "NCT Number".into()],
            summary_fields: vec!["Status".into()],
            link_fields: vec!["url".into()],
            skip_fields: Vec::new(),
        }
    }

    async fn fetch_rows(&self, filters: &TrialFilters) -> Result<Vec<Map<String, Value>>, BioQueryError> {
        let params = CtGovSearchParams {
            condition: filters.condition.clone(),
            intervention: filters.intervention.clone(),
            status: filters.status.clone(),
            location: filters.location.clone(),
            page_size: 0,
        };

        let studies = self.client.search(&params).await?;

        let mut rows: Vec<Map<String, Value>> = Vec::new();
        let mut seen_ncts: Vec<String> = Vec::new();

        for study in studies {
            let row = study_to_row(&study);

            // Phase filtering happens client-side; the v2 API has no direct
            // phase query parameter for this search form.
            if let Some(wanted) = filters.phase.as_deref() {
                let phases = row
                    .get("Phases")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !phases.is_empty() && !normalize_key(phases).contains(&normalize_key(wanted)) {
                    continue;
                }
            }

            let nct = row
                .get("NCT Number")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if !nct.is_empty() && seen_ncts.contains(&nct) {
                continue;
            }
            seen_ncts.push(nct);
            rows.push(row);
        }

        Ok(rows)
    }
}

fn study_to_row(study: &CtGovStudy) -> Map<String, Value> {
    let protocol = &study.protocol_section;
    let nct_id = protocol
        .identification_module
        .nct_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("N/A");
    let title = protocol
        .identification_module
        .brief_title
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(nct_id);
    let status = protocol
        .status_module
        .overall_status
        .as_deref()
        .unwrap_or("Unknown");
    let conditions = protocol.conditions_module.conditions.join(", ");
    let interventions = protocol
        .arms_interventions_module
        .interventions
        .iter()
        .filter_map(|i| i.name.as_deref())
        .collect::<Vec<_>>()
        .join(", ");
    let interventions = if interventions.is_empty() {
        "None".to_string()
    } else {
        interventions
    };
    let phases = protocol.design_module.phases.join(", ");
    let url = if nct_id != "N/A" {
        format!("https://clinicaltrials.gov/study/{nct_id}")
    } else {
        String::new()
    };

    let mut row = Map::new();
    row.insert("title".into(), Value::String(title.to_string()));
    row.insert("NCT Number".into(), Value::String(nct_id.to_string()));
    row.insert("Status".into(), Value::String(status.to_string()));
    row.insert("Condition".into(), Value::String(conditions));
    row.insert("Interventions".into(), Value::String(interventions));
    row.insert("Phases".into(), Value::String(phases));
    row.insert("url".into(), Value::String(url));
    row
}

#[async_trait]
impl QueryPipeline for TrialsPipeline {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn run(&self, query: &str) -> Result<RawResult, BioQueryError> {
        let filters = extract_trial_filters(self.oracle.as_ref(), query).await;
        info!(?filters, "Running trial retrieval");

        // Partial results over total failure: a failed fetch contributes an
        // empty table instead of aborting the query.
        let rows = match self.fetch_rows(&filters).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "Trial retrieval failed; returning empty result set");
                Vec::new()
            }
        };

        Ok(RawResult::Table(TabularRecord {
            rows,
            metadata: Self::metadata(),
        }))
    }
}
