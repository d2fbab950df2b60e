use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::BioQueryError;

const OPENTARGETS_BASE: &str = "https://api.platform.opentargets.org/api/v4";
const OPENTARGETS_API: &str = "opentargets";
const OPENTARGETS_BASE_ENV: &str = "BIOQUERY_OPENTARGETS_BASE";

const DEFAULT_CACHE_CAPACITY: usize = 128;

const DISEASE_KNOWN_DRUGS_QUERY: &str = r#"
query DiseaseKnownDrugs($efoId: String!) {
  disease(efoId: $efoId) {
    knownDrugs {
      rows {
        drug {
          name
          id
          maximumClinicalTrialPhase
        }
        phase
        label
        targetClass
      }
    }
  }
}
"#;

const DRUG_INDICATIONS_QUERY: &str = r#"
query DrugIndications($chemblId: String!) {
  drug(chemblId: $chemblId) {
    indications {
      rows {
        disease {
          name
          id
        }
        maxPhaseForIndication
      }
    }
  }
}
"#;

const DISEASE_ASSOCIATED_TARGETS_QUERY: &str = r#"
query DiseaseAssociatedTargets($efoId: String!) {
  disease(efoId: $efoId) {
    associatedTargets {
      rows {
        target {
          id
          approvedSymbol
          approvedName
        }
        score
      }
    }
  }
}
"#;

/// Bounded FIFO cache for GraphQL responses, keyed by query + variables.
///
/// Owned by the client rather than living in module-global state so tests can
/// inject a fresh one and clear it between runs.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Mutex<CacheInner>>,
    capacity: usize,
}

struct CacheInner {
    entries: HashMap<String, Value>,
    order: VecDeque<String>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &str) -> Option<Value> {
        let inner = self.inner.lock().ok()?;
        inner.entries.get(key).cloned()
    }

    fn put(&self, key: String, value: Value) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.entries.contains_key(&key) {
            inner.entries.insert(key, value);
            return;
        }
        while inner.order.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, value);
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
            inner.order.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

pub struct OpenTargetsClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    cache: ResponseCache,
}

impl OpenTargetsClient {
    pub fn new() -> Result<Self, BioQueryError> {
        Self::with_cache(ResponseCache::default())
    }

    pub fn with_cache(cache: ResponseCache) -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(OPENTARGETS_BASE, OPENTARGETS_BASE_ENV),
            cache,
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String, cache: ResponseCache) -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            cache,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/graphql", self.base.as_ref().trim_end_matches('/'))
    }

    async fn query_api(&self, query: &str, variables: Value) -> Result<Value, BioQueryError> {
        let cache_key = format!("{query}-{variables}");
        if let Some(hit) = self.cache.get(&cache_key) {
            debug!(variables = %variables, "Open Targets cache hit");
            return Ok(hit);
        }

        let body = GraphQlRequest { query, variables };
        let resp = self.client.post(self.endpoint()).json(&body).send().await?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, OPENTARGETS_API).await?;

        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(BioQueryError::Api {
                api: OPENTARGETS_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }

        let parsed: GraphQlResponse =
            serde_json::from_slice(&bytes).map_err(|source| BioQueryError::ApiJson {
                api: OPENTARGETS_API.to_string(),
                source,
            })?;

        if let Some(errors) = parsed.errors {
            let msg = errors
                .into_iter()
                .filter_map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            if !msg.is_empty() {
                return Err(BioQueryError::Api {
                    api: OPENTARGETS_API.to_string(),
                    message: msg,
                });
            }
        }

        let data = parsed.data.unwrap_or(Value::Null);
        self.cache.put(cache_key, data.clone());
        Ok(data)
    }

    fn rows_at(data: &Value, path: &[&str]) -> Vec<Value> {
        let mut node = data;
        for key in path {
            match node.get(key) {
                Some(next) => node = next,
                None => return Vec::new(),
            }
        }
        match node.get("rows") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => Vec::new(),
        }
    }

    pub async fn disease_known_drugs(&self, efo_id: &str) -> Result<Vec<Value>, BioQueryError> {
        let efo_id = require_id(efo_id, "EFO ID")?;
        let data = self
            .query_api(
                DISEASE_KNOWN_DRUGS_QUERY,
                serde_json::json!({"efoId": efo_id}),
            )
            .await?;
        Ok(Self::rows_at(&data, &["disease", "knownDrugs"]))
    }

    pub async fn drug_indications(&self, chembl_id: &str) -> Result<Vec<Value>, BioQueryError> {
        let chembl_id = require_id(chembl_id, "ChEMBL ID")?;
        let data = self
            .query_api(
                DRUG_INDICATIONS_QUERY,
                serde_json::json!({"chemblId": chembl_id}),
            )
            .await?;
        Ok(Self::rows_at(&data, &["drug", "indications"]))
    }

    pub async fn disease_associated_targets(
        &self,
        efo_id: &str,
    ) -> Result<Vec<Value>, BioQueryError> {
        let efo_id = require_id(efo_id, "EFO ID")?;
        let data = self
            .query_api(
                DISEASE_ASSOCIATED_TARGETS_QUERY,
                serde_json::json!({"efoId": efo_id}),
            )
            .await?;
        Ok(Self::rows_at(&data, &["disease", "associatedTargets"]))
    }
}

fn require_id<'a>(id: &'a str, what: &str) -> Result<&'a str, BioQueryError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(BioQueryError::InvalidArgument(format!(
            "{what} is required"
        )));
    }
    Ok(id)
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: Option<String>,
}
