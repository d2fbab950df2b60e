use serde::Serialize;
use serde_json::{Map, Value};

/// A raw fetch result before normalization. Upstream pipelines produce
/// structurally incompatible payloads; this union names the shapes the
/// normalization layer knows how to handle.
#[derive(Debug, Clone)]
pub enum RawResult {
    /// Row-oriented result set with a metadata sidecar shared by every row.
    Table(TabularRecord),
    /// A single mapping, possibly with nested sub-mappings.
    Mapping(Map<String, Value>),
    /// Anything we can only stringify. Degrades to a minimal record.
    Opaque(String),
    /// Nested sequence of results; flattened recursively.
    Batch(Vec<RawResult>),
}

#[derive(Debug, Clone)]
pub struct TabularRecord {
    pub rows: Vec<Map<String, Value>>,
    pub metadata: TableMetadata,
}

/// Display hints attached by the data source that produced a table. Checked
/// in order; empty hint lists fall back to the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct TableMetadata {
    pub source: Option<String>,
    pub title_fields: Vec<String>,
    pub summary_fields: Vec<String>,
    pub link_fields: Vec<String>,
    pub skip_fields: Vec<String>,
}

impl TableMetadata {
    pub fn for_source(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            ..Self::default()
        }
    }
}

/// The normalization target: a uniform, storage-ready display unit.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalRecord {
    pub source: String,
    pub title: String,
    pub summary: String,
    pub fields: Vec<FieldEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldEntry {
    pub label: String,
    pub value: String,
}
