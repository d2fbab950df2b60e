use std::borrow::Cow;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::BioQueryError;

const CTGOV_BASE: &str = "https://clinicaltrials.gov/api/v2";
const CTGOV_API: &str = "clinicaltrials.gov";
const CTGOV_BASE_ENV: &str = "BIOQUERY_CTGOV_BASE";

const DEFAULT_PAGE_SIZE: usize = 50;
// Upper bound on pageToken follow-ups so a pathological cursor cannot loop forever.
const MAX_PAGES: usize = 20;

#[derive(Clone)]
pub struct ClinicalTrialsClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
}

#[derive(Debug, Clone, Default)]
pub struct CtGovSearchParams {
    pub condition: Option<String>,
    pub intervention: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub page_size: usize,
}

impl ClinicalTrialsClient {
    pub fn new() -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(CTGOV_BASE, CTGOV_BASE_ENV),
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
        let bytes = crate::sources::read_limited_body(resp, CTGOV_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(BioQueryError::Api {
                api: CTGOV_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        serde_json::from_slice(&bytes).map_err(|source| BioQueryError::ApiJson {
            api: CTGOV_API.to_string(),
            source,
        })
    }

    /// Searches the v2 `/studies` endpoint, following `nextPageToken` cursors
    /// until the result set is exhausted.
    pub async fn search(
        &self,
        params: &CtGovSearchParams,
    ) -> Result<Vec<CtGovStudy>, BioQueryError> {
        let url = self.endpoint("studies");
        let page_size = if params.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            params.page_size
        };

        let mut studies: Vec<CtGovStudy> = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut req = self
                .client
                .get(&url)
                .query(&[("pageSize", page_size.to_string())]);

            if let Some(v) = trimmed(params.condition.as_deref()) {
                req = req.query(&[("query.cond", v)]);
            }
            if let Some(v) = trimmed(params.intervention.as_deref()) {
                req = req.query(&[("query.intr", v)]);
            }
            if let Some(v) = trimmed(params.status.as_deref()) {
                req = req.query(&[("filter.overallStatus", v)]);
            }
            if let Some(v) = trimmed(params.location.as_deref()) {
                req = req.query(&[("query.locn", v)]);
            }
            if let Some(token) = page_token.as_deref() {
                req = req.query(&[("pageToken", token)]);
            }

            let page: CtGovSearchResponse = self.get_json(req).await?;
            if page.studies.is_empty() {
                break;
            }
            studies.extend(page.studies);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(studies)
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CtGovSearchResponse {
    #[serde(default)]
    studies: Vec<CtGovStudy>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovStudy {
    #[serde(default)]
    pub protocol_section: CtGovProtocolSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovProtocolSection {
    #[serde(default)]
    pub identification_module: CtGovIdentification,
    #[serde(default)]
    pub status_module: CtGovStatus,
    #[serde(default)]
    pub conditions_module: CtGovConditions,
    #[serde(default)]
    pub arms_interventions_module: CtGovArmsInterventions,
    #[serde(default)]
    pub design_module: CtGovDesign,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovIdentification {
    pub nct_id: Option<String>,
    pub brief_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovStatus {
    pub overall_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovConditions {
    #[serde(default)]
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovArmsInterventions {
    #[serde(default)]
    pub interventions: Vec<CtGovIntervention>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovIntervention {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtGovDesign {
    #[serde(default)]
    pub phases: Vec<String>,
}
