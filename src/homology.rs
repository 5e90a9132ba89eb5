use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Accession, WHB_NAMESPACE, WMB_NAMESPACE, is_missing};
use crate::error::XmapError;
use crate::fs_util::open_table;
use crate::template::TemplateRecord;

pub const REQUIRED_COLUMNS: [&str; 3] = ["Human_cell_set_accession", "Mouse_accession", "score"];

/// One line of the human to mouse cell-set alignment table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomologyRow {
    #[serde(rename = "Human_cell_set_accession", default)]
    pub human_accession: String,
    #[serde(rename = "Mouse_accession", default)]
    pub mouse_accession: String,
    #[serde(default)]
    pub score: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomologyMapping {
    pub id: Accession,
    pub exact_match: Accession,
    pub confidence_score: String,
}

impl TemplateRecord for HomologyMapping {
    fn cells(&self) -> Vec<&str> {
        vec![
            self.id.as_str(),
            self.exact_match.as_str(),
            self.confidence_score.as_str(),
        ]
    }
}

/// Maps rows to `WHB` → `WMB` exact matches, skipping rows without both accessions.
/// Missing-value markers such as `NA` count as absent.
pub fn build_mappings(rows: &[HomologyRow]) -> Vec<HomologyMapping> {
    rows.iter()
        .enumerate()
        .filter_map(|(line, row)| {
            let human = row.human_accession.trim();
            let mouse = row.mouse_accession.trim();
            if is_missing(mouse) {
                return None;
            }
            if is_missing(human) {
                warn!(line = line + 2, mouse, "row has no human accession, skipping");
                return None;
            }
            Some(HomologyMapping {
                id: Accession::namespaced(WHB_NAMESPACE, human),
                exact_match: Accession::namespaced(WMB_NAMESPACE, mouse),
                confidence_score: if is_missing(&row.score) {
                    String::new()
                } else {
                    row.score.trim().to_string()
                },
            })
        })
        .collect()
}

pub fn read_rows(path: &Utf8Path) -> Result<Vec<HomologyRow>, XmapError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn row(human: &str, mouse: &str, score: &str) -> HomologyRow {
        HomologyRow {
            human_accession: human.to_string(),
            mouse_accession: mouse.to_string(),
            score: score.to_string(),
        }
    }

    #[test]
    fn rows_without_mouse_accession_are_dropped() {
        let rows = vec![
            row("CS202210140_1", "CS20230722_CLUS_0001", "0.87"),
            row("CS202210140_2", "", "0.5"),
            row("CS202210140_3", "   ", "0.4"),
        ];
        let mappings = build_mappings(&rows);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].id.as_str(), "WHB:CS202210140_1");
        assert_eq!(mappings[0].exact_match.as_str(), "WMB:CS20230722_CLUS_0001");
        assert_eq!(mappings[0].confidence_score, "0.87");
    }

    #[test]
    fn missing_value_markers_count_as_blank() {
        let rows = vec![
            row("CS202210140_1", "NA", "0.9"),
            row("CS202210140_2", "nan", "0.8"),
            row("N/A", "CS20230722_CLUS_0002", "0.7"),
            row("CS202210140_4", "CS20230722_CLUS_0004", "NaN"),
        ];
        let mappings = build_mappings(&rows);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].id.as_str(), "WHB:CS202210140_4");
        assert_eq!(mappings[0].exact_match.as_str(), "WMB:CS20230722_CLUS_0004");
        assert_eq!(mappings[0].confidence_score, "");
    }

    #[test]
    fn existing_prefixes_are_kept_once() {
        let mappings = build_mappings(&[row("WHB:H1", "WMB:M1", "1.0")]);
        assert_eq!(mappings[0].id.as_str(), "WHB:H1");
        assert_eq!(mappings[0].exact_match.as_str(), "WMB:M1");
    }
}
