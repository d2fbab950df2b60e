use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::error::BioQueryError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthRow {
    pub api: String,
    pub status: String,
    pub latency: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub total: usize,
    pub rows: Vec<HealthRow>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.healthy == self.total
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# BioQuery Health Check\n\n");
        out.push_str("| API | Status | Latency |\n");
        out.push_str("|-----|--------|---------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.api, row.status, row.latency
            ));
        }
        out.push_str(&format!(
            "\nStatus: {}/{} APIs healthy\n",
            self.healthy, self.total
        ));
        out
    }
}

async fn check_one(client: reqwest::Client, api: &str, url: &str) -> HealthRow {
    let start = Instant::now();
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await;

    match resp {
        Ok(resp) => {
            let status = resp.status();
            let elapsed = start.elapsed().as_millis();
            if status.is_success() {
                HealthRow {
                    api: api.to_string(),
                    status: "ok".into(),
                    latency: format!("{elapsed}ms"),
                }
            } else {
                HealthRow {
                    api: api.to_string(),
                    status: "error".into(),
                    latency: format!("{elapsed}ms (HTTP {})", status.as_u16()),
                }
            }
        }
        Err(err) => {
            let reason = if err.is_timeout() {
                "timeout"
            } else if err.is_connect() {
                "connect"
            } else {
                "error"
            };
            HealthRow {
                api: api.to_string(),
                status: "error".into(),
                latency: reason.into(),
            }
        }
    }
}

fn health_http_client() -> Result<reqwest::Client, BioQueryError> {
    static HEALTH_HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

    if let Some(client) = HEALTH_HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("bioquery-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(BioQueryError::HttpClientInit)?;

    match HEALTH_HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HEALTH_HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| BioQueryError::Api {
                api: "health".into(),
                message: "Health HTTP client initialization race".into(),
            }),
    }
}

/// Runs connectivity checks for the upstream APIs and the local model server.
///
/// # Errors
///
/// Returns an error when the shared HTTP client cannot be created.
pub async fn check() -> Result<HealthReport, BioQueryError> {
    let client = health_http_client()?;
    let ollama_tags = format!(
        "{}/api/tags",
        crate::sources::env_base("http://localhost:11434", "BIOQUERY_OLLAMA_BASE")
    );

    let (ctgov, opentargets, zooma, chembl, mygene, ollama) = tokio::join!(
        check_one(
            client.clone(),
            "ClinicalTrials",
            "https://clinicaltrials.gov/api/v2/studies?query.cond=cancer&pageSize=1"
        ),
        check_one(
            client.clone(),
            "Open Targets",
            "https://api.platform.opentargets.org/api/v4/graphql/schema"
        ),
        check_one(
            client.clone(),
            "Zooma",
            "https://www.ebi.ac.uk/spot/zooma/v2/api/services/annotate?propertyValue=cancer"
        ),
        check_one(
            client.clone(),
            "ChEMBL",
            "https://www.ebi.ac.uk/chembl/api/data/molecule/search.json?q=aspirin&limit=1"
        ),
        check_one(
            client.clone(),
            "MyGene",
            "https://mygene.info/v3/query?q=BRCA1&size=1"
        ),
        check_one(client.clone(), "Ollama", &ollama_tags),
    );

    let rows = vec![ctgov, opentargets, zooma, chembl, mygene, ollama];
    let healthy = rows.iter().filter(|r| r.status == "ok").count();
    Ok(HealthReport {
        healthy,
        total: rows.len(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn check_one_reports_ok_and_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/up"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = health_http_client().unwrap();
        let ok = check_one(client.clone(), "Up", &format!("{}/up", server.uri())).await;
        assert_eq!(ok.status, "ok");

        let bad = check_one(client, "Down", &format!("{}/down", server.uri())).await;
        assert_eq!(bad.status, "error");
        assert!(bad.latency.contains("HTTP 503"));
    }

    #[test]
    fn markdown_report_counts_healthy_rows() {
        let report = HealthReport {
            healthy: 1,
            total: 2,
            rows: vec![
                HealthRow {
                    api: "ClinicalTrials".into(),
                    status: "ok".into(),
                    latency: "12ms".into(),
                },
                HealthRow {
                    api: "Ollama".into(),
                    status: "error".into(),
                    latency: "connect".into(),
                },
            ],
        };

        assert!(!report.all_healthy());
        let markdown = report.to_markdown();
        assert!(markdown.contains("| ClinicalTrials | ok | 12ms |"));
        assert!(markdown.contains("Status: 1/2 APIs healthy"));
    }
}
