//! Open Targets pipeline: entity extraction, identifier resolution, the three
//! GraphQL fetches, and the merge-rank step.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::BioQueryError;
use crate::extract::TextOracle;
use crate::extract::entities::{EntityResolver, extract_entities};
use crate::pipelines::QueryPipeline;
use crate::sources::opentargets::OpenTargetsClient;
use crate::transform::merge::{Table, merge_and_rank};
use crate::transform::record::{RawResult, TableMetadata, TabularRecord};

const SOURCE_NAME: &str = "Open Targets";
const TARGETS_SOURCE_NAME: &str = "Open Targets (targets)";

pub struct TargetsPipeline {
    oracle: Arc<dyn TextOracle>,
    resolver: EntityResolver,
    opentargets: OpenTargetsClient,
}

impl TargetsPipeline {
    pub fn new(oracle: Arc<dyn TextOracle>) -> Result<Self, BioQueryError> {
        Ok(Self {
            oracle,
            resolver: EntityResolver::new()?,
            opentargets: OpenTargetsClient::new()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        oracle: Arc<dyn TextOracle>,
        resolver: EntityResolver,
        opentargets: OpenTargetsClient,
    ) -> Self {
        Self {
            oracle,
            resolver,
            opentargets,
        }
    }
}

fn table_to_raw(table: Table, source: &str) -> RawResult {
    RawResult::Table(TabularRecord {
        rows: table.rows,
        metadata: TableMetadata::for_source(source),
    })
}

/// Extends `rows` with a fetch's contribution; a failed fetch contributes
/// nothing and the sibling fetches proceed.
fn absorb(rows: &mut Vec<Value>, fetched: Result<Vec<Value>, BioQueryError>, what: &str, id: &str) {
    match fetched {
        Ok(mut new_rows) => rows.append(&mut new_rows),
        Err(err) => warn!(id, error = %err, "{what} fetch failed; contributing no rows"),
    }
}

#[async_trait]
impl QueryPipeline for TargetsPipeline {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn run(&self, query: &str) -> Result<RawResult, BioQueryError> {
        // Extraction failures fail the whole run; there is nothing sensible
        // to fetch without entities.
        let entities = extract_entities(self.oracle.as_ref(), query).await?;
        let resolved = self.resolver.resolve(&entities).await;
        info!(
            drugs = resolved.drugs.len(),
            diseases = resolved.diseases.len(),
            targets = resolved.targets.len(),
            "Resolved entities"
        );

        let mut known_drugs_rows: Vec<Value> = Vec::new();
        let mut indications_rows: Vec<Value> = Vec::new();
        let mut association_rows: Vec<Value> = Vec::new();

        for link in &resolved.diseases {
            let Some(efo_id) = link.efo_id.as_deref() else {
                continue;
            };
            absorb(
                &mut known_drugs_rows,
                self.opentargets.disease_known_drugs(efo_id).await,
                "Known drugs",
                efo_id,
            );
        }

        for link in &resolved.drugs {
            let Some(chembl_id) = link.chembl_id.as_deref() else {
                continue;
            };
            absorb(
                &mut indications_rows,
                self.opentargets.drug_indications(chembl_id).await,
                "Drug indications",
                chembl_id,
            );
        }

        for link in &resolved.diseases {
            let Some(efo_id) = link.efo_id.as_deref() else {
                continue;
            };
            absorb(
                &mut association_rows,
                self.opentargets.disease_associated_targets(efo_id).await,
                "Associated targets",
                efo_id,
            );
        }

        let (ranked, targets) =
            merge_and_rank(&known_drugs_rows, &indications_rows, &association_rows);

        Ok(RawResult::Batch(vec![
            table_to_raw(ranked, SOURCE_NAME),
            table_to_raw(targets, TARGETS_SOURCE_NAME),
        ]))
    }
}
