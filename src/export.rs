use std::io::Write;

use crate::domain::ExportKind;
use crate::error::XmapError;
use crate::graph::Record;
use crate::report::compact_json_cell;

pub fn write_export<W: Write>(
    kind: ExportKind,
    records: &[Record],
    out: W,
) -> Result<(), XmapError> {
    match kind {
        ExportKind::Labels => write_labels(records, out),
        ExportKind::CellSetMap => write_cell_set_map(records, out),
    }
}

/// `label` / `accession` pairs, one per record.
pub fn write_labels<W: Write>(records: &[Record], out: W) -> Result<(), XmapError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    writer
        .write_record(["label", "accession"])
        .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    for record in records {
        let field = |name: &str| {
            record
                .get(name)
                .map(compact_json_cell)
                .ok_or_else(|| XmapError::GraphQuery(format!("record has no '{name}' column")))
        };
        writer
            .write_record([field("label")?, field("accession")?])
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| XmapError::Filesystem(err.to_string()))
}

/// Every column of the first record, in query order.
pub fn write_cell_set_map<W: Write>(records: &[Record], out: W) -> Result<(), XmapError> {
    let Some(first) = records.first() else {
        return Ok(());
    };
    let columns: Vec<&String> = first.keys().collect();
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    writer
        .write_record(&columns)
        .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    for record in records {
        let row = columns
            .iter()
            .map(|column| record.get(*column).map(compact_json_cell).unwrap_or_default());
        writer
            .write_record(row)
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| XmapError::Filesystem(err.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn labels_export() {
        let records = vec![
            record(json!({"label": "5 Astro", "accession": "CS20230722_SUBC_005"})),
            record(json!({"label": "6 Oligo", "accession": "CS20230722_SUBC_006"})),
        ];
        let mut buf = Vec::new();
        write_labels(&records, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "label\taccession\n5 Astro\tCS20230722_SUBC_005\n6 Oligo\tCS20230722_SUBC_006\n"
        );
    }

    #[test]
    fn labels_export_requires_columns() {
        let records = vec![record(json!({"name": "5 Astro"}))];
        let err = write_labels(&records, Vec::new()).unwrap_err();
        assert_matches!(err, XmapError::GraphQuery(_));
    }

    #[test]
    fn cell_set_map_uses_first_record_columns() {
        let records = vec![
            record(json!({"accession": "CS1", "parents": ["CS0"]})),
            record(json!({"accession": "CS2", "extra": 1})),
        ];
        let mut buf = Vec::new();
        write_cell_set_map(&records, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "accession\tparents\nCS1\t\"[\"\"CS0\"\"]\"\nCS2\t\n"
        );
    }
}
