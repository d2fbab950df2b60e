use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::BioQueryError;

const OLLAMA_BASE: &str = "http://localhost:11434";
const OLLAMA_API: &str = "ollama";
const OLLAMA_BASE_ENV: &str = "BIOQUERY_OLLAMA_BASE";
const OLLAMA_MODEL_ENV: &str = "BIOQUERY_OLLAMA_MODEL";
const DEFAULT_MODEL: &str = "gemma2:latest";

/// Client for a locally hosted language model. Used as an opaque oracle for
/// query classification and entity extraction; callers own prompt text and
/// output parsing.
pub struct OllamaClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    model: String,
}

impl OllamaClient {
    pub fn new() -> Result<Self, BioQueryError> {
        let model = std::env::var(OLLAMA_MODEL_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            client: crate::sources::shared_client()?,
            base: crate::sources::env_base(OLLAMA_BASE, OLLAMA_BASE_ENV),
            model,
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base: String) -> Result<Self, BioQueryError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base.as_ref().trim_end_matches('/'))
    }

    /// Runs one non-streaming completion and returns the raw response text.
    pub async fn generate(&self, prompt: &str) -> Result<String, BioQueryError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let resp = self.client.post(self.endpoint()).json(&body).send().await?;
        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, OLLAMA_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(BioQueryError::Api {
                api: OLLAMA_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_slice(&bytes).map_err(|source| BioQueryError::ApiJson {
                api: OLLAMA_API.to_string(),
                source,
            })?;

        Ok(parsed.response.unwrap_or_default())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}
