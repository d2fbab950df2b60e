//! Normalization layer: converts any [`RawResult`] into [`CanonicalRecord`]s.
//!
//! The contract is permissive by design: a malformed entry degrades to a
//! minimal record instead of aborting the batch.

use serde_json::{Map, Value};

use crate::transform::record::{CanonicalRecord, FieldEntry, RawResult, TableMetadata};

const FALLBACK_SOURCE: &str = "Result";

const DEFAULT_TITLE_KEYS: &[&str] = &[
    "title",
    "name",
    "label",
    "nct number",
    "drug.name",
    "target.approvedsymbol",
    "id",
];

const DEFAULT_SUMMARY_KEYS: &[&str] = &[
    "summary",
    "description",
    "status",
    "condition",
    "disease",
    "targetclass",
    "mechanism",
];

const BASE_SKIP_KEYS: &[&str] = &[
    "title",
    "name",
    "summary",
    "description",
    "source",
    "link",
    "url",
    "href",
];

/// Keys compared after [`normalize_key`], so `trial_url` and `trialUrl` both match.
const LINK_KEYS: &[&str] = &["url", "link", "trialurl", "targeturl", "href"];

/// Curated display labels. Raw keys without an entry here do not surface as
/// fields; only recognized columns are shown.
fn field_label(normalized_key: &str) -> Option<&'static str> {
    let label = match normalized_key {
        "phase" | "phases" => "Trial phase",
        "maxphaseforindication" => "Max indication phase",
        "status" | "overallstatus" => "Recruitment status",
        "condition" | "conditions" => "Condition",
        "disease" | "diseasename" => "Disease",
        "diseaseid" => "Disease ID",
        "evidence" | "evidencescore" => "Evidence score",
        "score" => "Score",
        "combinedscore" => "Combined score",
        "mechanism" => "Mechanism",
        "target" => "Target",
        "targetclass" => "Target class",
        "targetapprovedsymbol" => "Target symbol",
        "targetapprovedname" => "Target name",
        "targetid" => "Target ID",
        "drug" | "drugname" => "Drug",
        "drugid" => "Drug ID",
        "nctnumber" => "NCT number",
        "interventions" => "Interventions",
        _ => return None,
    };
    Some(label)
}

/// Lower-cases and strips non-alphanumeric characters, so `NCT Number`,
/// `nct_number` and `nctNumber` all compare equal.
pub(crate) fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Flattens nested sub-mappings into dotted-path keys (`drug.name`).
pub(crate) fn flatten_map(data: &Map<String, Value>) -> Map<String, Value> {
    let mut items = Map::new();
    flatten_into(data, "", &mut items);
    items
}

fn flatten_into(data: &Map<String, Value>, parent: &str, out: &mut Map<String, Value>) {
    for (key, value) in data {
        let new_key = if parent.is_empty() {
            key.clone()
        } else {
            format!("{parent}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(inner, &new_key, out),
            other => {
                out.insert(new_key, other.clone());
            }
        }
    }
}

/// Emptiness test for field values. Nulls, blank strings, empty lists and
/// not-a-number sentinels all count as empty.
pub(crate) fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty()
                && !trimmed.eq_ignore_ascii_case("nan")
                && !trimmed.eq_ignore_ascii_case("n/a")
        }
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn first_nonempty<'a>(candidate: &'a Map<String, Value>, keys: &[String]) -> Option<&'a Value> {
    for target in keys {
        let target = normalize_key(target);
        for (actual_key, value) in candidate {
            if normalize_key(actual_key) == target && is_non_empty(value) {
                return Some(value);
            }
        }
    }
    None
}

fn extract_link(candidate: &Map<String, Value>) -> Option<String> {
    for (key, value) in candidate {
        if let Value::String(s) = value
            && s.starts_with("http")
            && LINK_KEYS.contains(&normalize_key(key).as_str())
        {
            return Some(s.clone());
        }
    }
    None
}

fn build_fields(candidate: &Map<String, Value>, skip_keys: &[String]) -> Vec<FieldEntry> {
    let skip: Vec<String> = skip_keys.iter().map(|k| normalize_key(k)).collect();
    let mut fields: Vec<FieldEntry> = Vec::new();

    for (key, value) in candidate {
        let normalized_key = normalize_key(key);
        if skip.contains(&normalized_key) || !is_non_empty(value) {
            continue;
        }
        let Some(label) = field_label(&normalized_key) else {
            continue;
        };
        if fields.iter().any(|f| f.label == label) {
            continue;
        }
        fields.push(FieldEntry {
            label: label.to_string(),
            value: display_value(value),
        });
    }

    fields
}

fn hint_or_default(hints: &[String], defaults: &[&str]) -> Vec<String> {
    if hints.is_empty() {
        defaults.iter().map(|k| k.to_string()).collect()
    } else {
        hints.to_vec()
    }
}

fn normalize_mapping(
    candidate: &Map<String, Value>,
    fallback_source: Option<&str>,
    metadata: &TableMetadata,
) -> CanonicalRecord {
    // Working map: original keys unioned with their dotted-path aliases, so
    // hints can name either form.
    let mut combined = candidate.clone();
    for (key, value) in flatten_map(candidate) {
        combined.entry(key).or_insert(value);
    }

    let title_keys = hint_or_default(&metadata.title_fields, DEFAULT_TITLE_KEYS);
    let summary_keys = hint_or_default(&metadata.summary_fields, DEFAULT_SUMMARY_KEYS);

    let title = first_nonempty(&combined, &title_keys).map(display_value);
    let summary = first_nonempty(&combined, &summary_keys).map(display_value);

    let mut link = extract_link(&combined);
    if link.is_none() && !metadata.link_fields.is_empty() {
        link = first_nonempty(&combined, &metadata.link_fields)
            .and_then(|v| v.as_str())
            .filter(|s| s.starts_with("http"))
            .map(str::to_string);
    }

    let source = candidate
        .get("source")
        .filter(|v| is_non_empty(v))
        .map(display_value)
        .or_else(|| metadata.source.clone())
        .or_else(|| fallback_source.map(str::to_string))
        .unwrap_or_else(|| FALLBACK_SOURCE.to_string());

    let mut skip_keys = metadata.skip_fields.clone();
    skip_keys.extend(BASE_SKIP_KEYS.iter().map(|k| k.to_string()));
    let fields = build_fields(&combined, &skip_keys);

    CanonicalRecord {
        title: title.unwrap_or_else(|| source.clone()),
        summary: summary.unwrap_or_default(),
        fields,
        link,
        raw: Value::Object(candidate.clone()),
        source,
    }
}

fn opaque_record(text: &str, fallback_source: Option<&str>) -> CanonicalRecord {
    let source = fallback_source.unwrap_or(FALLBACK_SOURCE).to_string();
    CanonicalRecord {
        title: source.clone(),
        summary: text.to_string(),
        fields: Vec::new(),
        link: None,
        raw: Value::String(text.to_string()),
        source,
    }
}

/// Normalizes a batch of raw results into canonical display records.
///
/// Pure and total: nested batches are flattened, table rows inherit their
/// sidecar metadata, and entries that fit no structured shape degrade to a
/// minimal record rather than failing the batch.
pub fn normalize_results(raw_results: Vec<RawResult>) -> Vec<CanonicalRecord> {
    let mut normalized = Vec::new();
    for entry in raw_results {
        normalize_entry(entry, &mut normalized);
    }
    normalized
}

fn normalize_entry(entry: RawResult, out: &mut Vec<CanonicalRecord>) {
    match entry {
        RawResult::Batch(entries) => {
            for inner in entries {
                normalize_entry(inner, out);
            }
        }
        RawResult::Table(table) => {
            for row in &table.rows {
                out.push(normalize_mapping(row, None, &table.metadata));
            }
        }
        RawResult::Mapping(map) => {
            out.push(normalize_mapping(&map, None, &TableMetadata::default()));
        }
        RawResult::Opaque(text) => {
            out.push(opaque_record(&text, None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::record::TabularRecord;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn normalize_key_is_case_and_punctuation_insensitive() {
        assert_eq!(normalize_key("NCT Number"), "nctnumber");
        assert_eq!(normalize_key("drug.name"), "drugname");
        assert_eq!(normalize_key("max_Phase-For Indication"), "maxphaseforindication");
    }

    #[test]
    fn flatten_map_produces_dotted_paths() {
        let map = as_map(json!({"drug": {"name": "OLAPARIB", "id": "CHEMBL521686"}, "phase": 3}));
        let flat = flatten_map(&map);
        assert_eq!(flat["drug.name"], "OLAPARIB");
        assert_eq!(flat["drug.id"], "CHEMBL521686");
        assert_eq!(flat["phase"], 3);
    }

    #[test]
    fn empty_input_normalizes_to_empty_output() {
        assert!(normalize_results(Vec::new()).is_empty());
        assert!(normalize_results(vec![RawResult::Batch(Vec::new())]).is_empty());
    }

    #[test]
    fn nested_batches_are_flattened_in_order() {
        let results = normalize_results(vec![RawResult::Batch(vec![
            RawResult::Mapping(as_map(json!({"title": "first"}))),
            RawResult::Batch(vec![RawResult::Mapping(as_map(json!({"title": "second"})))]),
        ])]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "first");
        assert_eq!(results[1].title, "second");
    }

    #[test]
    fn trial_row_with_hints_uses_them() {
        let row = as_map(json!({
            "title": "Trial A",
            "NCT Number": "NCT123",
            "Status": "Recruiting",
            "Phase": "Phase 2"
        }));
        let table = TabularRecord {
            rows: vec![row],
            metadata: TableMetadata {
                source: Some("ClinicalTrials.gov".into()),
                title_fields: vec!["title".into(), "NCT Number".into()],
                summary_fields: vec!["Status".into()],
                ..TableMetadata::default()
            },
        };

        let results = normalize_results(vec![RawResult::Table(table)]);
        assert_eq!(results.len(), 1);
        let record = &results[0];
        assert_eq!(record.source, "ClinicalTrials.gov");
        assert_eq!(record.title, "Trial A");
        assert_eq!(record.summary, "Recruiting");
        assert!(
            record
                .fields
                .iter()
                .any(|f| f.label == "Trial phase" && f.value == "Phase 2")
        );
    }

    #[test]
    fn title_hint_falls_through_to_next_candidate() {
        let row = as_map(json!({"title": "", "NCT Number": "NCT123"}));
        let table = TabularRecord {
            rows: vec![row],
            metadata: TableMetadata {
                source: Some("ClinicalTrials.gov".into()),
                title_fields: vec!["title".into(), "NCT Number".into()],
                ..TableMetadata::default()
            },
        };
        let results = normalize_results(vec![RawResult::Table(table)]);
        assert_eq!(results[0].title, "NCT123");
    }

    #[test]
    fn title_falls_back_to_source_when_nothing_matches() {
        let record = &normalize_results(vec![RawResult::Mapping(as_map(json!({
            "source": "Open Targets",
            "unrecognized": "value"
        })))])[0];
        assert_eq!(record.title, "Open Targets");
        assert_eq!(record.source, "Open Targets");
        assert_eq!(record.summary, "");
    }

    #[test]
    fn nested_mapping_title_matches_dotted_alias() {
        let record = &normalize_results(vec![RawResult::Mapping(as_map(json!({
            "drug": {"name": "OLAPARIB", "id": "CHEMBL521686"},
            "phase": 4
        })))])[0];
        assert_eq!(record.title, "OLAPARIB");
        assert!(
            record
                .fields
                .iter()
                .any(|f| f.label == "Trial phase" && f.value == "4")
        );
        assert!(
            record
                .fields
                .iter()
                .any(|f| f.label == "Drug ID" && f.value == "CHEMBL521686")
        );
    }

    #[test]
    fn fields_never_contain_duplicate_labels() {
        let record = &normalize_results(vec![RawResult::Mapping(as_map(json!({
            "phase": "Phase 2",
            "phases": "Phase 3",
            "status": "Recruiting",
            "overall_status": "Completed"
        })))])[0];
        let mut labels: Vec<&str> = record.fields.iter().map(|f| f.label.as_str()).collect();
        let before = labels.len();
        labels.dedup();
        assert_eq!(labels.len(), before);
        // First occurrence wins.
        assert!(
            record
                .fields
                .iter()
                .any(|f| f.label == "Trial phase" && f.value == "Phase 2")
        );
    }

    #[test]
    fn empty_and_sentinel_values_are_dropped() {
        let record = &normalize_results(vec![RawResult::Mapping(as_map(json!({
            "phase": "",
            "conditions": [],
            "score": "NaN",
            "mechanism": null,
            "target_class": "PARP inhibitor"
        })))])[0];
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields[0].label, "Target class");
    }

    #[test]
    fn list_values_are_comma_joined() {
        let record = &normalize_results(vec![RawResult::Mapping(as_map(json!({
            "conditions": ["Breast Cancer", "Ovarian Cancer"]
        })))])[0];
        assert_eq!(record.fields[0].value, "Breast Cancer, Ovarian Cancer");
    }

    #[test]
    fn link_requires_link_like_key_and_http_scheme() {
        let record = &normalize_results(vec![RawResult::Mapping(as_map(json!({
            "description": "https://not-a-link-key.example.org",
            "trial_url": "https://clinicaltrials.gov/study/NCT123"
        })))])[0];
        assert_eq!(
            record.link.as_deref(),
            Some("https://clinicaltrials.gov/study/NCT123")
        );

        let no_link = &normalize_results(vec![RawResult::Mapping(as_map(json!({
            "url": "ftp://example.org/file"
        })))])[0];
        assert!(no_link.link.is_none());
    }

    #[test]
    fn link_field_hint_is_used_when_scan_finds_nothing() {
        let row = as_map(json!({"study_page": "https://example.org/study/1"}));
        let table = TabularRecord {
            rows: vec![row],
            metadata: TableMetadata {
                source: Some("ClinicalTrials.gov".into()),
                link_fields: vec!["study_page".into()],
                ..TableMetadata::default()
            },
        };
        let record = &normalize_results(vec![RawResult::Table(table)])[0];
        assert_eq!(record.link.as_deref(), Some("https://example.org/study/1"));
    }

    #[test]
    fn opaque_entries_degrade_to_minimal_records() {
        let record = &normalize_results(vec![RawResult::Opaque("503 upstream error".into())])[0];
        assert_eq!(record.source, "Result");
        assert_eq!(record.title, "Result");
        assert_eq!(record.summary, "503 upstream error");
        assert!(record.fields.is_empty());
        assert!(record.link.is_none());
    }

    #[test]
    fn raw_mapping_is_retained_unmodified() {
        let map = as_map(json!({"drug": {"name": "OLAPARIB"}}));
        let record = &normalize_results(vec![RawResult::Mapping(map.clone())])[0];
        assert_eq!(record.raw, Value::Object(map));
    }

    #[test]
    fn metadata_skip_fields_are_honored() {
        let row = as_map(json!({"phase": "Phase 2", "status": "Recruiting"}));
        let table = TabularRecord {
            rows: vec![row],
            metadata: TableMetadata {
                source: Some("ClinicalTrials.gov".into()),
                skip_fields: vec!["phase".into()],
                ..TableMetadata::default()
            },
        };
        let record = &normalize_results(vec![RawResult::Table(table)])[0];
        assert!(record.fields.iter().all(|f| f.label != "Trial phase"));
        assert!(record.fields.iter().any(|f| f.label == "Recruitment status"));
    }
}
