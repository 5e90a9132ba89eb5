use std::io::Write;

use camino::Utf8Path;

use crate::classify::ClassifiedRow;
use crate::domain::MatchTier;
use crate::error::XmapError;
use crate::fs_util::write_atomic;

/// A template column: its header name and the ROBOT directive on row two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateColumn {
    pub name: &'static str,
    pub directive: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSchema {
    pub columns: Vec<TemplateColumn>,
}

impl TemplateSchema {
    pub fn new(columns: &[(&'static str, &str)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|&(name, directive)| TemplateColumn {
                    name,
                    directive: directive.to_string(),
                })
                .collect(),
        }
    }

    pub fn bg2wmb() -> Self {
        let split = |tier: MatchTier| format!("AI {} SPLIT=|", tier.predicate());
        Self::new(&[
            ("Group", ""),
            ("Type", "TYPE"),
            ("accession_group", "ID"),
            ("exact_match", split(MatchTier::Exact).as_str()),
            ("related_match", split(MatchTier::Related).as_str()),
            ("broad_match", split(MatchTier::Broad).as_str()),
        ])
    }

    pub fn whb2wmb() -> Self {
        Self::new(&[
            ("ID", "ID"),
            ("skos:exactMatch", format!("AI {}", MatchTier::Exact.predicate()).as_str()),
            ("confidence_score", "AI IAO:0000136"),
        ])
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name).collect()
    }

    pub fn directives(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|column| column.directive.as_str())
            .collect()
    }
}

/// A row that can be laid out under a [`TemplateSchema`].
pub trait TemplateRecord {
    fn cells(&self) -> Vec<&str>;
}

impl TemplateRecord for ClassifiedRow {
    fn cells(&self) -> Vec<&str> {
        vec![
            self.group.as_str(),
            self.row_type.as_str(),
            self.accession_group.as_str(),
            self.exact_match.as_str(),
            self.related_match.as_str(),
            self.broad_match.as_str(),
        ]
    }
}

pub struct TemplateEmitter {
    schema: TemplateSchema,
}

impl TemplateEmitter {
    pub fn new(schema: TemplateSchema) -> Self {
        Self { schema }
    }

    /// Header names, then directives, then `rows` in order, tab separated.
    pub fn write<R: TemplateRecord, W: Write>(&self, rows: &[R], out: W) -> Result<(), XmapError> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
        writer
            .write_record(self.schema.names())
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
        writer
            .write_record(self.schema.directives())
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
        let width = self.schema.columns.len();
        for row in rows {
            let cells = row.cells();
            if cells.len() != width {
                return Err(XmapError::Filesystem(format!(
                    "template row has {} cells, schema has {width}",
                    cells.len()
                )));
            }
            writer
                .write_record(cells)
                .map_err(|err| XmapError::Filesystem(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_file<R: TemplateRecord>(
        &self,
        rows: &[R],
        dest: &Utf8Path,
    ) -> Result<(), XmapError> {
        write_atomic(dest, |out| self.write(rows, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair(String, String);

    impl TemplateRecord for Pair {
        fn cells(&self) -> Vec<&str> {
            vec![self.0.as_str(), self.1.as_str()]
        }
    }

    #[test]
    fn emits_names_then_directives_then_rows() {
        let emitter = TemplateEmitter::new(TemplateSchema::new(&[
            ("ID", "ID"),
            ("m", "AI skos:exactMatch"),
        ]));
        let rows = vec![
            Pair("WHB:1".to_string(), "WMB:9".to_string()),
            Pair("WHB:2".to_string(), String::new()),
        ];
        let mut buf = Vec::new();
        emitter.write(&rows, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "ID\tm\nID\tAI skos:exactMatch\nWHB:1\tWMB:9\nWHB:2\t\n");
    }

    #[test]
    fn rejects_rows_wider_than_schema() {
        let emitter = TemplateEmitter::new(TemplateSchema::new(&[("ID", "ID")]));
        let rows = vec![Pair("a".to_string(), "b".to_string())];
        assert!(emitter.write(&rows, Vec::new()).is_err());
    }

    #[test]
    fn bg2wmb_directive_row() {
        let schema = TemplateSchema::bg2wmb();
        assert_eq!(schema.directives()[2], "ID");
        assert_eq!(
            schema.directives()[3..],
            [
                "AI skos:exactMatch SPLIT=|",
                "AI skos:relatedMatch SPLIT=|",
                "AI skos:broadMatch SPLIT=|",
            ]
        );
        assert_eq!(
            TemplateSchema::whb2wmb().directives(),
            vec!["ID", "AI skos:exactMatch", "AI IAO:0000136"]
        );
    }
}
