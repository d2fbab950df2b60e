//! Merge-rank engine: combines known-drugs, drug-indications and
//! target-association rows into one ranked table plus a targets-only table.

use serde_json::{Map, Value};
use tracing::warn;

use crate::transform::canonical::flatten_map;

const KNOWN_DRUGS_COLUMNS: &[&str] = &["drug.name", "drug.id", "phase", "label", "targetClass"];
const INDICATIONS_COLUMNS: &[&str] = &["disease.name", "disease.id", "maxPhaseForIndication"];
const ASSOCIATIONS_COLUMNS: &[&str] = &["target.id", "target.approvedSymbol", "score"];

const LEFT_SUFFIX: &str = "_known_drugs";
const RIGHT_SUFFIX: &str = "_drug_indications";

pub const COMBINED_SCORE_COLUMN: &str = "combined_score";
const PHASE_COLUMN: &str = "phase";
const INDICATION_PHASE_COLUMN: &str = "maxPhaseForIndication";

/// Column-ordered table over flattened (dotted-path) rows. A table always has
/// defined columns, even with zero rows, so downstream code never has to
/// handle a missing-column case.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl Table {
    fn with_columns(defaults: &[&str]) -> Self {
        Self {
            columns: defaults.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn add_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The column pair the outer join matches on.
///
/// The inherited default pairs `drug.name` against `disease.name`, which
/// looks like a data-shape mismatch in the upstream design rather than an
/// intentional key; it is kept for compatibility but overridable.
#[derive(Debug, Clone)]
pub struct JoinKeys {
    pub left: String,
    pub right: String,
}

impl Default for JoinKeys {
    fn default() -> Self {
        Self {
            left: "drug.name".to_string(),
            right: "disease.name".to_string(),
        }
    }
}

/// Flattens nested rows into a table, falling back to the given column set
/// when the input is empty.
fn rows_to_table(rows: &[Value], default_columns: &[&str]) -> Table {
    if rows.is_empty() {
        return Table::with_columns(default_columns);
    }

    let mut table = Table::default();
    for row in rows {
        let flat = match row {
            Value::Object(map) => flatten_map(map),
            other => {
                // Non-mapping rows should not occur; keep them visible rather
                // than dropping data silently.
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        for key in flat.keys() {
            table.add_column(key);
        }
        table.rows.push(flat);
    }
    table
}

fn join_value(row: &Map<String, Value>, key: &str) -> Option<Value> {
    row.get(key).filter(|v| !v.is_null()).cloned()
}

fn suffixed(table: &Table, collisions: &[String], suffix: &str) -> Table {
    let rename = |name: &str| -> String {
        if collisions.iter().any(|c| c == name) {
            format!("{name}{suffix}")
        } else {
            name.to_string()
        }
    };

    Table {
        columns: table.columns.iter().map(|c| rename(c)).collect(),
        rows: table
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(k, v)| (rename(k), v.clone()))
                    .collect::<Map<String, Value>>()
            })
            .collect(),
    }
}

/// Outer join on `keys`; unmatched rows from either side are kept with nulls
/// for the other side's columns. Rows whose join cell is null never match.
fn outer_join(left: &Table, right: &Table, keys: &JoinKeys) -> Table {
    let collisions: Vec<String> = left
        .columns
        .iter()
        .filter(|c| right.columns.contains(c))
        .filter(|c| c.as_str() != keys.left && c.as_str() != keys.right)
        .cloned()
        .collect();

    let left = suffixed(left, &collisions, LEFT_SUFFIX);
    let right = suffixed(right, &collisions, RIGHT_SUFFIX);

    let mut out = Table::default();
    for col in left.columns.iter().chain(right.columns.iter()) {
        out.add_column(col);
    }

    let mut matched_right = vec![false; right.rows.len()];

    for left_row in &left.rows {
        let probe = join_value(left_row, &keys.left);
        let mut matched = false;

        if let Some(probe) = probe.as_ref() {
            for (idx, right_row) in right.rows.iter().enumerate() {
                if join_value(right_row, &keys.right).as_ref() == Some(probe) {
                    let mut merged = left_row.clone();
                    for (k, v) in right_row {
                        merged.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                    out.rows.push(merged);
                    matched_right[idx] = true;
                    matched = true;
                }
            }
        }

        if !matched {
            out.rows.push(left_row.clone());
        }
    }

    for (idx, right_row) in right.rows.iter().enumerate() {
        if !matched_right[idx] {
            out.rows.push(right_row.clone());
        }
    }

    out
}

/// Plain concatenation: stacks rows over the union of columns.
fn concat(left: &Table, right: &Table) -> Table {
    let mut out = Table::default();
    for col in left.columns.iter().chain(right.columns.iter()) {
        out.add_column(col);
    }
    out.rows.extend(left.rows.iter().cloned());
    out.rows.extend(right.rows.iter().cloned());
    out
}

/// Numeric coercion for phase-like cells: numbers pass through, numeric
/// strings parse, everything else becomes 0.
fn coerce_numeric(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn ensure_numeric_column(table: &mut Table, name: &str) {
    table.add_column(name);
    for row in &mut table.rows {
        let coerced = coerce_numeric(row.get(name));
        let number = serde_json::Number::from_f64(coerced)
            .unwrap_or_else(|| serde_json::Number::from(0));
        row.insert(name.to_string(), Value::Number(number));
    }
}

/// Combines the three result sets into a ranked table and a targets table,
/// using the default join-key heuristic.
pub fn merge_and_rank(
    known_drugs_rows: &[Value],
    drug_indications_rows: &[Value],
    target_associations_rows: &[Value],
) -> (Table, Table) {
    merge_and_rank_with(
        known_drugs_rows,
        drug_indications_rows,
        target_associations_rows,
        &JoinKeys::default(),
    )
}

/// As [`merge_and_rank`], with an explicit join-key pair.
///
/// The join is best-effort: tables lacking the join columns are concatenated
/// instead, and zero overlap simply yields outer-join rows with nulls.
pub fn merge_and_rank_with(
    known_drugs_rows: &[Value],
    drug_indications_rows: &[Value],
    target_associations_rows: &[Value],
    keys: &JoinKeys,
) -> (Table, Table) {
    let known_drugs = rows_to_table(known_drugs_rows, KNOWN_DRUGS_COLUMNS);
    let indications = rows_to_table(drug_indications_rows, INDICATIONS_COLUMNS);
    let associations = rows_to_table(target_associations_rows, ASSOCIATIONS_COLUMNS);

    let joinable = known_drugs.columns.iter().any(|c| c == &keys.left)
        && indications.columns.iter().any(|c| c == &keys.right);

    let mut merged = if joinable {
        if *keys == JoinKeys::default() && !known_drugs.is_empty() && !indications.is_empty() {
            warn!(
                left = keys.left.as_str(),
                right = keys.right.as_str(),
                "Joining on the inherited drug-name/disease-name heuristic"
            );
        }
        outer_join(&known_drugs, &indications, keys)
    } else {
        concat(&known_drugs, &indications)
    };

    ensure_numeric_column(&mut merged, PHASE_COLUMN);
    ensure_numeric_column(&mut merged, INDICATION_PHASE_COLUMN);
    merged.add_column(COMBINED_SCORE_COLUMN);

    for row in &mut merged.rows {
        let phase = coerce_numeric(row.get(PHASE_COLUMN));
        let indication_phase = coerce_numeric(row.get(INDICATION_PHASE_COLUMN));
        let score = phase.max(indication_phase);
        let number =
            serde_json::Number::from_f64(score).unwrap_or_else(|| serde_json::Number::from(0));
        row.insert(COMBINED_SCORE_COLUMN.to_string(), Value::Number(number));
    }

    // Stable sort keeps tied rows in discovery order.
    merged.rows.sort_by(|a, b| {
        let score_a = coerce_numeric(a.get(COMBINED_SCORE_COLUMN));
        let score_b = coerce_numeric(b.get(COMBINED_SCORE_COLUMN));
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    (merged, associations)
}

impl PartialEq for JoinKeys {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left && self.right == other.right
    }
}
