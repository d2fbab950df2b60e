use std::borrow::Cow;

use serde::Deserialize;
use tracing::info;

use crate::error::BioQueryError;

const ZOOMA_BASE: &str = "https://www.ebi.ac.uk/spot/zooma/v2/api";
const ZOOMA_API: &str = "zooma";
const ZOOMA_BASE_ENV: &str = "BIOQUERY_ZOOMA_BASE";

pub struct ZoomaClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

impl ZoomaClient {
    pub fn new() -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(ZOOMA_BASE, ZOOMA_BASE_ENV),
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

    /// Annotates a free-text term and returns the first EFO identifier among
    /// the semantic tags, or `None` when Zooma has no EFO mapping for it.
    pub async fn efo_id(&self, term: &str) -> Result<Option<String>, BioQueryError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(BioQueryError::InvalidArgument(
                "Zooma term is required".into(),
            ));
        }

        let url = self.endpoint("services/annotate");
        let resp = self
            .client
            .get(&url)
            .query(&[("propertyValue", term)])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, ZOOMA_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(BioQueryError::Api {
                api: ZOOMA_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }

        let annotations: Vec<ZoomaAnnotation> =
            serde_json::from_slice(&bytes).map_err(|source| BioQueryError::ApiJson {
                api: ZOOMA_API.to_string(),
                source,
            })?;

        for annotation in annotations {
            for tag in annotation.semantic_tags {
                if tag.contains("EFO") {
                    let efo_id = tag.rsplit('/').next().unwrap_or(&tag).to_string();
                    info!(term, efo_id, "Resolved EFO ID");
                    return Ok(Some(efo_id));
                }
            }
        }

        Ok(None)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ZoomaAnnotation {
    #[serde(default, rename = "semanticTags")]
    semantic_tags: Vec<String>,
}
