//! Entity extraction and identifier normalization for the drug/target
//! pipeline: free text → drug/disease/target terms → EFO/ChEMBL/Ensembl IDs.

use tracing::warn;

use crate::error::BioQueryError;
use crate::extract::{TextOracle, decode_json_flex, string_list};
use crate::sources::chembl::ChemblClient;
use crate::sources::mygene::MyGeneClient;
use crate::sources::zooma::ZoomaClient;

const ENTITY_PROMPT: &str = r#"Extract all drug names, disease names, and target names mentioned in the following sentence.
If none are mentioned, use an empty list for that field.

Sentence: "{sentence}"

Output the result in JSON format with keys: "drug", "disease", and "target". Each key should map to a list of strings.
"#;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedEntities {
    pub drugs: Vec<String>,
    pub diseases: Vec<String>,
    pub targets: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty() && self.diseases.is_empty() && self.targets.is_empty()
    }
}

/// A term with whichever external identifiers could be resolved for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityLink {
    pub term: String,
    pub efo_id: Option<String>,
    pub chembl_id: Option<String>,
    pub ensembl_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedEntities {
    pub drugs: Vec<EntityLink>,
    pub diseases: Vec<EntityLink>,
    pub targets: Vec<EntityLink>,
}

/// Asks the oracle for entity lists. Unlike trial filter extraction this is
/// strict: an unparseable completion fails the whole drug/target run, since
/// fabricating entities from a bad parse would poison every downstream fetch.
pub async fn extract_entities(
    oracle: &dyn TextOracle,
    sentence: &str,
) -> Result<ExtractedEntities, BioQueryError> {
    let prompt = ENTITY_PROMPT.replace("{sentence}", sentence);
    let text = oracle.complete(&prompt).await?;
    let parsed = decode_json_flex("entity extraction", &text)?;

    Ok(ExtractedEntities {
        drugs: string_list(&parsed, "drug"),
        diseases: string_list(&parsed, "disease"),
        targets: string_list(&parsed, "target"),
    })
}

/// Resolves extracted terms to external identifiers. Per-term failures are
/// non-fatal: the term simply carries no ID and is skipped by later fetches.
pub struct EntityResolver {
    zooma: ZoomaClient,
    chembl: ChemblClient,
    mygene: MyGeneClient,
}

impl EntityResolver {
    pub fn new() -> Result<Self, BioQueryError> {
        Ok(Self {
            zooma: ZoomaClient::new()?,
            chembl: ChemblClient::new()?,
            mygene: MyGeneClient::new()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(zooma: ZoomaClient, chembl: ChemblClient, mygene: MyGeneClient) -> Self {
        Self {
            zooma,
            chembl,
            mygene,
        }
    }

    async fn efo_id(&self, term: &str) -> Option<String> {
        match self.zooma.efo_id(term).await {
            Ok(id) => id,
            Err(err) => {
                warn!(term, error = %err, "No EFO ID resolved");
                None
            }
        }
    }

    pub async fn resolve(&self, entities: &ExtractedEntities) -> ResolvedEntities {
        let mut resolved = ResolvedEntities::default();

        for term in &entities.diseases {
            resolved.diseases.push(EntityLink {
                term: term.clone(),
                efo_id: self.efo_id(term).await,
                ..EntityLink::default()
            });
        }

        for term in &entities.drugs {
            let efo_id = self.efo_id(term).await;
            let chembl_id = if efo_id.is_none() {
                match self.chembl.molecule_chembl_id(term).await {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(term, error = %err, "No ChEMBL ID resolved");
                        None
                    }
                }
            } else {
                None
            };
            resolved.drugs.push(EntityLink {
                term: term.clone(),
                efo_id,
                chembl_id,
                ..EntityLink::default()
            });
        }

        for term in &entities.targets {
            let ensembl_id = match self.mygene.ensembl_gene_id(term).await {
                Ok(id) => id,
                Err(err) => {
                    warn!(term, error = %err, "No Ensembl ID resolved");
                    None
                }
            };
            resolved.targets.push(EntityLink {
                term: term.clone(),
                ensembl_id,
                ..EntityLink::default()
            });
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::TextOracle;
    use async_trait::async_trait;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedOracle(&'static str);

    #[async_trait]
    impl TextOracle for FixedOracle {
        async fn complete(&self, _prompt: &str) -> Result<String, BioQueryError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn extract_entities_parses_lists_and_scalars() {
        let oracle = FixedOracle(
            r#"{"drug": ["olaparib"], "disease": "breast cancer", "target": []}"#,
        );
        let entities = extract_entities(&oracle, "whatever").await.unwrap();
        assert_eq!(entities.drugs, vec!["olaparib"]);
        assert_eq!(entities.diseases, vec!["breast cancer"]);
        assert!(entities.targets.is_empty());
    }

    #[tokio::test]
    async fn extract_entities_fails_closed_on_chatter() {
        let oracle = FixedOracle("I do not see any entities in that sentence.");
        let err = extract_entities(&oracle, "whatever").await.unwrap_err();
        assert!(matches!(err, BioQueryError::ParseFailure { .. }));
    }

    async fn resolver_against(server: &MockServer) -> EntityResolver {
        EntityResolver::from_parts(
            ZoomaClient::new_for_test(server.uri()).unwrap(),
            ChemblClient::new_for_test(server.uri()).unwrap(),
            MyGeneClient::new_for_test(server.uri()).unwrap(),
        )
    }

    #[tokio::test]
    async fn resolve_assigns_ids_per_entity_kind() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/services/annotate"))
            .and(query_param("propertyValue", "breast cancer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"semanticTags": ["http://www.ebi.ac.uk/efo/EFO_0000305"]}
            ])))
            .mount(&server)
            .await;
        // Drug term: Zooma has no EFO mapping, so ChEMBL is consulted.
        Mock::given(method("GET"))
            .and(path("/services/annotate"))
            .and(query_param("propertyValue", "olaparib"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/molecule/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "molecules": [{"molecule_chembl_id": "CHEMBL521686"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": [{"ensembl": {"gene": "ENSG00000012048"}}]
            })))
            .mount(&server)
            .await;

        let resolver = resolver_against(&server).await;
        let entities = ExtractedEntities {
            drugs: vec!["olaparib".into()],
            diseases: vec!["breast cancer".into()],
            targets: vec!["BRCA1".into()],
        };
        let resolved = resolver.resolve(&entities).await;

        assert_eq!(resolved.diseases[0].efo_id.as_deref(), Some("EFO_0000305"));
        assert_eq!(resolved.drugs[0].chembl_id.as_deref(), Some("CHEMBL521686"));
        assert!(resolved.drugs[0].efo_id.is_none());
        assert_eq!(resolved.targets[0].ensembl_id.as_deref(), Some("ENSG00000012048"));
    }

    #[tokio::test]
    async fn resolution_failures_leave_terms_without_ids() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/services/annotate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/molecule/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "molecules": []
            })))
            .mount(&server)
            .await;

        let resolver = resolver_against(&server).await;
        let entities = ExtractedEntities {
            drugs: vec!["mystery-compound".into()],
            diseases: vec!["mystery-disease".into()],
            targets: Vec::new(),
        };
        let resolved = resolver.resolve(&entities).await;

        assert_eq!(resolved.diseases.len(), 1);
        assert!(resolved.diseases[0].efo_id.is_none());
        assert!(resolved.drugs[0].chembl_id.is_none());
    }
}
