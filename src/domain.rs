use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::XmapError;

/// CURIE prefix for Whole Mouse Brain cell sets.
pub const WMB_NAMESPACE: &str = "WMB";
/// CURIE prefix for Whole Human Brain cell sets.
pub const WHB_NAMESPACE: &str = "WHB";
/// CURIE prefix for HMBA Basal Ganglia groups.
pub const BG_NAMESPACE: &str = "BG";

/// A cell-set accession carrying exactly one namespace prefix, e.g. `WMB:CS20230722_SUBC_313`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn namespaced(namespace: &str, raw: &str) -> Self {
        let raw = raw.trim();
        let prefix = format!("{namespace}:");
        if raw.starts_with(&prefix) {
            Self(raw.to_string())
        } else {
            Self(format!("{prefix}{raw}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placeholders spreadsheet and dataframe exports write into empty cells.
const MISSING_MARKERS: [&str; 8] = ["na", "n/a", "#n/a", "<na>", "nan", "-nan", "null", "none"];

/// True for a blank cell or one holding a missing-value marker such as `NA`.
pub fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty()
        || MISSING_MARKERS
            .iter()
            .any(|marker| cell.eq_ignore_ascii_case(marker))
}

/// Joins accessions with `|`, the separator ROBOT splits on.
pub fn join_accessions(accessions: &[Accession]) -> String {
    accessions
        .iter()
        .map(Accession::as_str)
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub cell_label: String,
    pub cell_set_accession: String,
    #[serde(default)]
    pub labelset: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub annotations: Vec<AnnotationEntry>,
}

impl Taxonomy {
    pub fn from_json(raw: &str) -> Result<Self, XmapError> {
        serde_json::from_str(raw).map_err(|err| XmapError::TaxonomyParse(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    None,
    One,
    Many,
}

impl Cardinality {
    pub fn of<T>(items: &[T]) -> Self {
        match items.len() {
            0 => Cardinality::None,
            1 => Cardinality::One,
            _ => Cardinality::Many,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Related,
    Broad,
}

impl MatchTier {
    pub fn predicate(&self) -> &'static str {
        match self {
            MatchTier::Exact => "skos:exactMatch",
            MatchTier::Related => "skos:relatedMatch",
            MatchTier::Broad => "skos:broadMatch",
        }
    }
}

/// How nested report values are flattened into CSV cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CellStyle {
    #[default]
    Multiline,
    CompactJson,
}

impl fmt::Display for CellStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellStyle::Multiline => write!(f, "multiline"),
            CellStyle::CompactJson => write!(f, "compact-json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    Labels,
    CellSetMap,
}

impl ExportKind {
    /// Name of the Cypher file (without extension) backing this export.
    pub fn cypher_name(&self) -> &'static str {
        match self {
            ExportKind::Labels => "export_mouse_subclass_labels_and_accessions",
            ExportKind::CellSetMap => "cell_set_map",
        }
    }
}

/// Queries bundled with the binary, addressed by name on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedQuery {
    ReportBgMappings,
}

impl NamedQuery {
    pub fn name(&self) -> &'static str {
        match self {
            NamedQuery::ReportBgMappings => "REPORT_BG_MAPPINGS",
        }
    }

    pub fn cypher(&self) -> &'static str {
        match self {
            NamedQuery::ReportBgMappings => REPORT_BG_MAPPINGS,
        }
    }
}

impl FromStr for NamedQuery {
    type Err = XmapError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "REPORT_BG_MAPPINGS" => Ok(NamedQuery::ReportBgMappings),
            _ => Err(XmapError::UnknownQuery(value.to_string())),
        }
    }
}

const REPORT_BG_MAPPINGS: &str = r#"
MATCH (tax:Individual)-[:annotations]->(cell_set:Cell_cluster)-[:has_labelset]->(ls:Individual)
WHERE tax.title = ['HMBA Basal Ganglia Consensus Taxonomy']
AND ls.label_rdfs = ['Group']
AND NOT (cell_set)-[:subcluster_of*0..]->(:Cell_cluster { label_rdfs: ['Nonneuron']})
MATCH (cell_set)-[:subcluster_of*0..]->(cc2:Cell_cluster)-[:has_labelset]->(ls2)
OPTIONAL MATCH (cc2)-[:composed_primarily_of]->(c:Cell)
OPTIONAL MATCH (cell_set)-[:exactMatch]->(at:Cell_cluster)-[:has_labelset]->(ls3)
RETURN DISTINCT cell_set.label_rdfs[0] AS Group,
COLLECT(DISTINCT({ id: c.curie, name: c.label_rdfs[0],
                   labelset: ls2.label_rdfs[0],
                   cell_set: cc2.label_rdfs[0]})) AS cl_mappings,
collect(distinct{ labelset: ls3.label_rdfs[0],
                  cell_set: at.label_rdfs[0]}) AS WMB_AT,
    cell_set.rationale_dois AS refs,
SIZE([x IN COLLECT(c.curie) WHERE x IS NOT NULL]) = 0 AS no_cl_mapping
ORDER BY no_cl_mapping DESC
"#;
