use crate::transform::record::CanonicalRecord;

const HEADER: &str = "Source,Title,Summary,Fields,Link";

/// Renders normalized records as RFC 4180 CSV with a fixed header row.
/// Detail fields are folded into one column as `label: value` pairs.
pub(crate) fn records_to_csv(records: &[CanonicalRecord]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');

    for record in records {
        let fields = record
            .fields
            .iter()
            .map(|f| format!("{}: {}", f.label, f.value))
            .collect::<Vec<_>>()
            .join("; ");
        let link = record.link.as_deref().unwrap_or_default();

        let cells = [
            record.source.as_str(),
            record.title.as_str(),
            record.summary.as_str(),
            fields.as_str(),
            link,
        ];
        let row = cells.map(quote_cell).join(",");
        out.push_str(&row);
        out.push('\n');
    }

    out
}

fn quote_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
