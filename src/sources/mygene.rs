use std::borrow::Cow;

use serde::Deserialize;
use tracing::info;

use crate::error::BioQueryError;

const MYGENE_BASE: &str = "https://mygene.info/v3";
const MYGENE_API: &str = "mygene.info";
const MYGENE_BASE_ENV: &str = "BIOQUERY_MYGENE_BASE";

pub struct MyGeneClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl MyGeneClient {
    pub fn new() -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(MYGENE_BASE, MYGENE_BASE_ENV),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String) -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_ref().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Resolves a gene symbol to an Ensembl gene ID. The `ensembl` field comes
    /// back as either a single object or a list depending on the hit.
    pub async fn ensembl_gene_id(&self, term: &str) -> Result<Option<String>, BioQueryError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(BioQueryError::InvalidArgument(
                "Gene query term is required".into(),
            ));
        }

        let url = self.endpoint("query");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("q", term),
                ("species", "human"),
                ("fields", "ensembl.gene"),
            ])
            .send()
            .await?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, MYGENE_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(BioQueryError::Api {
                api: MYGENE_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }

        let parsed: MyGeneQueryResponse =
            serde_json::from_slice(&bytes).map_err(|source| BioQueryError::ApiJson {
                api: MYGENE_API.to_string(),
                source,
            })?;

        for hit in parsed.hits {
            let Some(ensembl) = hit.ensembl else { continue };
            let gene = match ensembl {
                MyGeneEnsemblField::One(e) => e.gene,
                MyGeneEnsemblField::Many(list) => list.into_iter().find_map(|e| e.gene),
            };
            if let Some(gene) = gene.map(|g| g.trim().to_string()).filter(|g| !g.is_empty()) {
                info!(term, ensembl_id = gene.as_str(), "Resolved Ensembl gene ID");
                return Ok(Some(gene));
            }
        }

        Ok(None)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MyGeneQueryResponse {
    #[serde(default)]
    hits: Vec<MyGeneHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct MyGeneHit {
    ensembl: Option<MyGeneEnsemblField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MyGeneEnsemblField {
    One(MyGeneEnsembl),
    Many(Vec<MyGeneEnsembl>),
}

#[derive(Debug, Clone, Deserialize)]
struct MyGeneEnsembl {
    gene: Option<String>,
}
