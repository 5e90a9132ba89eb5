use std::collections::BTreeMap;
use std::io::Write;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::XmapError;
use crate::fs_util::open_table;

pub const REQUIRED_COLUMNS: [&str; 2] = ["cell_type", "cellTypeName_"];
pub const MOUSE_PREFIX: &str = "mm_";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CellTypeRow {
    #[serde(default)]
    pub cell_type: String,
    #[serde(rename = "cellTypeName_", default)]
    pub cell_type_name: String,
}

/// All cell sets curated to one Cell Ontology term name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClGroup {
    pub name: String,
    pub cell_types: Vec<String>,
}

/// Groups rows by CL term name (sorted), keeping cell types in input order.
pub fn aggregate(rows: &[CellTypeRow]) -> Vec<ClGroup> {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for row in rows {
        groups
            .entry(row.cell_type_name.as_str())
            .or_default()
            .push(row.cell_type.clone());
    }
    groups
        .into_iter()
        .map(|(name, cell_types)| ClGroup {
            name: format!("{MOUSE_PREFIX}{name}"),
            cell_types,
        })
        .collect()
}

pub fn read_rows(path: &Utf8Path) -> Result<Vec<CellTypeRow>, XmapError> {
    let mut reader = open_table(path, b'\t', &REQUIRED_COLUMNS)?;
    reader
        .deserialize()
        .map(|row| {
            row.map_err(|err| XmapError::InputRead {
                path: path.to_string(),
                message: err.to_string(),
            })
        })
        .collect()
}

pub fn write_groups<W: Write>(groups: &[ClGroup], out: W) -> Result<(), XmapError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    writer
        .write_record(["cellTypeName_", "cell_type"])
        .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    for group in groups {
        let cell_types = serde_json::to_string(&group.cell_types)
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
        writer
            .write_record([group.name.as_str(), cell_types.as_str()])
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| XmapError::Filesystem(err.to_string()))
}
