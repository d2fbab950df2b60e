use std::borrow::Cow;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::BioQueryError;

const CHEMBL_BASE: &str = "https://www.ebi.ac.uk/chembl/api/data";
const CHEMBL_API: &str = "chembl";
const CHEMBL_BASE_ENV: &str = "BIOQUERY_CHEMBL_BASE";

pub struct ChemblClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl ChemblClient {
    pub fn new() -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(CHEMBL_BASE, CHEMBL_BASE_ENV),
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

    async fn get_json<T: DeserializeOwned>(
        &self,
        req: reqwest_middleware::RequestBuilder,
    ) -> Result<T, BioQueryError> {
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, CHEMBL_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(BioQueryError::Api {
                api: CHEMBL_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        serde_json::from_slice(&bytes).map_err(|source| BioQueryError::ApiJson {
            api: CHEMBL_API.to_string(),
            source,
        })
    }

    /// Resolves a free-text drug term to its registry ID via molecule search.
    /// Returns `None` when no molecule matches.
    pub async fn molecule_chembl_id(&self, term: &str) -> Result<Option<String>, BioQueryError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(BioQueryError::InvalidArgument(
                "ChEMBL search term is required".into(),
            ));
        }

        let url = self.endpoint("molecule/search.json");
        let resp: ChemblSearchResponse = self
            .get_json(self.client.get(&url).query(&[("q", term), ("limit", "1")]))
            .await?;

        let id = resp
            .molecules
            .into_iter()
            .filter_map(|m| m.molecule_chembl_id)
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty());

        if let Some(id) = id.as_deref() {
            info!(term, chembl_id = id, "Resolved ChEMBL ID");
        }
        Ok(id)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChemblSearchResponse {
    #[serde(default)]
    molecules: Vec<ChemblMolecule>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChemblMolecule {
    molecule_chembl_id: Option<String>,
}
