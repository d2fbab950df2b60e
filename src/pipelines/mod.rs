//! Data-fetch pipelines invoked by the dispatch orchestrator.

use async_trait::async_trait;

use crate::error::BioQueryError;
use crate::transform::record::RawResult;

pub(crate) mod targets;
pub(crate) mod trials;

/// One end-to-end fetch pipeline: free-text query in, raw results out.
///
/// Per-fetch failures are absorbed inside the pipeline (partial results over
/// total failure); only failures that invalidate the whole run, like an
/// unparseable entity extraction, surface as errors.
#[async_trait]
pub trait QueryPipeline: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, query: &str) -> Result<RawResult, BioQueryError>;
}
