use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cl_mapping;
use crate::classify::{ClassifiedRow, Classifier, SourceRow};
use crate::config::ProjectLayout;
use crate::domain::{CellStyle, ExportKind, MatchTier, NamedQuery, Taxonomy, is_missing};
use crate::error::XmapError;
use crate::export::write_export;
use crate::fs_util::{delimiter_for, open_table, read_to_string, write_atomic, write_bytes_atomic};
use crate::graph::{GraphQuery, Params};
use crate::homology;
use crate::index::{IndexPolicy, LabelCollision, LabelIndex};
use crate::matrix::{DEFAULT_MIN_SCORE, SimilarityMatrix, write_long};
use crate::report::{ReportPaths, write_report};
use crate::sheet::{SheetClient, export_url};
use crate::taxonomy::{TaxonomyClient, load_taxonomy_file};
use crate::template::{TemplateEmitter, TemplateSchema};

pub const BG2WMB_COLUMNS: [&str; 4] = [
    "Group",
    "accession_group",
    "curated_ABC_WMB_supertype",
    "curated_ABC_WMB_subclass",
];

#[derive(Debug, Clone)]
pub struct Bg2WmbOptions {
    pub input: Option<Utf8PathBuf>,
    pub output: Option<Utf8PathBuf>,
    pub taxonomy_file: Option<Utf8PathBuf>,
    pub subclass_labelset: String,
    pub policy: IndexPolicy,
}

impl Default for Bg2WmbOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            taxonomy_file: None,
            subclass_labelset: "subclass".to_string(),
            policy: IndexPolicy::LastWins,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub query: NamedQuery,
    pub params: Params,
    pub output: Option<Utf8PathBuf>,
    pub cell_style: CellStyle,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TierCounts {
    pub exact: usize,
    pub related: usize,
    pub broad: usize,
}

impl TierCounts {
    fn tally(rows: &[ClassifiedRow]) -> Self {
        let count = |tier: MatchTier| rows.iter().filter(|row| !row.field(tier).is_empty()).count();
        Self {
            exact: count(MatchTier::Exact),
            related: count(MatchTier::Related),
            broad: count(MatchTier::Broad),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableResult {
    pub job: String,
    pub input: String,
    pub output: String,
    pub rows_read: usize,
    pub rows_written: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiers: Option<TierCounts>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<LabelCollision>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetResult {
    pub url: String,
    pub output: String,
    pub bytes: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub query: String,
    pub rows: usize,
    pub dry_run: bool,
    pub csv_path: Option<String>,
    pub markdown_path: Option<String>,
    pub generated_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<T: TaxonomyClient, S: SheetClient> {
    layout: ProjectLayout,
    taxonomy: T,
    sheet: S,
}

impl<T: TaxonomyClient, S: SheetClient> App<T, S> {
    pub fn new(layout: ProjectLayout, taxonomy: T, sheet: S) -> Self {
        Self {
            layout,
            taxonomy,
            sheet,
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Curated BG groups to WMB supertypes/subclasses as a ROBOT template.
    pub fn bg2wmb(
        &self,
        options: Bg2WmbOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TableResult, XmapError> {
        let started = Instant::now();
        let input = self.path_or(options.input.as_deref(), self.layout.bg2wmb_input());
        let output = self.path_or(options.output.as_deref(), self.layout.bg2wmb_template());

        sink.event(ProgressEvent {
            message: "phase=Taxonomy; loading annotations".to_string(),
            elapsed: None,
        });
        let taxonomy = self.load_taxonomy(options.taxonomy_file.as_deref())?;

        let supertypes =
            LabelIndex::build_with_policy(&taxonomy.annotations, None, options.policy)?;
        let subclasses = LabelIndex::build_with_policy(
            &taxonomy.annotations,
            Some(options.subclass_labelset.as_str()),
            options.policy,
        )?;
        info!(
            labels = supertypes.len(),
            subclasses = subclasses.len(),
            "label indexes built"
        );

        sink.event(ProgressEvent {
            message: format!("phase=Classify; reading {input}"),
            elapsed: Some(started.elapsed()),
        });
        let mut reader = open_table(&input, delimiter_for(&input), &BG2WMB_COLUMNS)?;
        let mut rows_read = 0usize;
        let mut skipped = 0usize;
        let classifier = Classifier::new(&supertypes, &subclasses, &self.layout.namespace);
        let mut classified = Vec::new();
        for row in reader.deserialize::<SourceRow>() {
            let row = row.map_err(|err| XmapError::InputRead {
                path: input.to_string(),
                message: err.to_string(),
            })?;
            rows_read += 1;
            if row.is_blank() {
                skipped += 1;
                continue;
            }
            if is_missing(&row.accession_group) {
                warn!(
                    line = rows_read + 1,
                    group = %row.group,
                    "row has no accession_group, skipping"
                );
                skipped += 1;
                continue;
            }
            classified.push(classifier.classify(&row));
        }

        TemplateEmitter::new(TemplateSchema::bg2wmb()).write_file(&classified, &output)?;
        sink.event(ProgressEvent {
            message: format!("phase=Write; {} rows to {output}", classified.len()),
            elapsed: Some(started.elapsed()),
        });

        let mut collisions = supertypes.collisions().to_vec();
        collisions.extend_from_slice(subclasses.collisions());

        Ok(TableResult {
            job: "bg2wmb".to_string(),
            input: input.to_string(),
            output: output.to_string(),
            rows_read,
            rows_written: classified.len(),
            skipped,
            tiers: Some(TierCounts::tally(&classified)),
            collisions,
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    /// Human to mouse homology mappings as a ROBOT template.
    pub fn whb2wmb(
        &self,
        input: Option<&Utf8Path>,
        output: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<TableResult, XmapError> {
        let input = self.path_or(input, self.layout.whb2wmb_input());
        let output = self.path_or(output, self.layout.whb2wmb_template());

        sink.event(ProgressEvent {
            message: format!("phase=Read; {input}"),
            elapsed: None,
        });
        let rows = homology::read_rows(&input)?;
        let mappings = homology::build_mappings(&rows);
        TemplateEmitter::new(TemplateSchema::whb2wmb()).write_file(&mappings, &output)?;
        info!(mappings = mappings.len(), output = %output, "generated ROBOT template");

        Ok(TableResult {
            job: "whb2wmb".to_string(),
            input: input.to_string(),
            output: output.to_string(),
            rows_read: rows.len(),
            rows_written: mappings.len(),
            skipped: rows.len() - mappings.len(),
            tiers: None,
            collisions: Vec::new(),
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    /// Downloads one worksheet as CSV and stores it verbatim.
    pub fn fetch_sheet(
        &self,
        sheet_id: &str,
        gid: &str,
        output: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<SheetResult, XmapError> {
        let output = self.path_or(output, self.layout.homology_sheet());
        let url = export_url(sheet_id, gid);
        sink.event(ProgressEvent {
            message: format!("phase=Download; {url}"),
            elapsed: None,
        });
        let bytes = self.sheet.export_csv(sheet_id, gid)?;
        write_bytes_atomic(&output, &bytes)?;
        info!(output = %output, bytes = bytes.len(), "downloaded sheet");

        Ok(SheetResult {
            url,
            output: output.to_string(),
            bytes: bytes.len(),
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    /// Runs a named query and writes the CSV and Markdown reports.
    pub fn report(
        &self,
        graph: &dyn GraphQuery,
        options: ReportOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ReportResult, XmapError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Query; {}", options.query.name()),
            elapsed: None,
        });
        let cypher = options.query.cypher();
        let records = graph.run_query(cypher, &options.params)?;

        let mut result = ReportResult {
            query: options.query.name().to_string(),
            rows: records.len(),
            dry_run: options.dry_run,
            csv_path: None,
            markdown_path: None,
            generated_at: Utc::now().to_rfc3339(),
        };
        if records.is_empty() {
            info!("no results returned");
            return Ok(result);
        }

        let csv = self.path_or(options.output.as_deref(), self.layout.default_report());
        let paths = ReportPaths::for_csv(&csv);
        write_report(&records, cypher, &options.params, options.cell_style, &paths)?;
        sink.event(ProgressEvent {
            message: format!("phase=Write; {} rows to {}", records.len(), paths.csv),
            elapsed: Some(started.elapsed()),
        });

        result.csv_path = Some(paths.csv.to_string());
        result.markdown_path = Some(paths.markdown.to_string());
        Ok(result)
    }

    /// Runs the Cypher file behind `kind` and writes its rows as TSV.
    pub fn export(
        &self,
        graph: &dyn GraphQuery,
        kind: ExportKind,
        output: Option<&Utf8Path>,
        sink: &dyn ProgressSink,
    ) -> Result<TableResult, XmapError> {
        let cypher_path = self.layout.cypher_file(kind.cypher_name());
        let cypher = read_to_string(&cypher_path)?;
        let default = match kind {
            ExportKind::Labels => self.layout.mouse_labels_export(),
            ExportKind::CellSetMap => self.layout.cell_set_map_export(),
        };
        let output = self.path_or(output, default);

        sink.event(ProgressEvent {
            message: format!("phase=Query; {cypher_path}"),
            elapsed: None,
        });
        let records = graph.run_query(&cypher, &Params::new())?;
        if records.is_empty() && kind == ExportKind::CellSetMap {
            info!("no results returned from query");
        } else {
            write_atomic(&output, |out| write_export(kind, &records, out))?;
            info!(rows = records.len(), output = %output, "exported rows");
        }

        Ok(TableResult {
            job: match kind {
                ExportKind::Labels => "export-labels".to_string(),
                ExportKind::CellSetMap => "export-cell-set-map".to_string(),
            },
            input: cypher_path.to_string(),
            output: output.to_string(),
            rows_read: records.len(),
            rows_written: records.len(),
            skipped: 0,
            tiers: None,
            collisions: Vec::new(),
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    /// Square similarity matrix to a long `r, c, score` table.
    pub fn melt(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        min_score: Option<f64>,
        sink: &dyn ProgressSink,
    ) -> Result<TableResult, XmapError> {
        let input = self.layout.resolve(input);
        let output = self.layout.resolve(output);
        sink.event(ProgressEvent {
            message: format!("phase=Read; {input}"),
            elapsed: None,
        });
        let raw = read_to_string(&input)?;
        let matrix = SimilarityMatrix::read(raw.as_bytes())?;
        let pairs = matrix.melt(min_score.unwrap_or(DEFAULT_MIN_SCORE));
        write_atomic(&output, |out| write_long(&pairs, out))?;

        let cells = matrix.row_labels.len() * matrix.column_labels.len();
        Ok(TableResult {
            job: "melt".to_string(),
            input: input.to_string(),
            output: output.to_string(),
            rows_read: cells,
            rows_written: pairs.len(),
            skipped: cells - pairs.len(),
            tiers: None,
            collisions: Vec::new(),
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    /// Cell types grouped under their curated Cell Ontology term.
    pub fn aggregate_cl(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<TableResult, XmapError> {
        let input = self.layout.resolve(input);
        let output = self.layout.resolve(output);
        sink.event(ProgressEvent {
            message: format!("phase=Read; {input}"),
            elapsed: None,
        });
        let rows = cl_mapping::read_rows(&input)?;
        let groups = cl_mapping::aggregate(&rows);
        write_atomic(&output, |out| cl_mapping::write_groups(&groups, out))?;

        Ok(TableResult {
            job: "aggregate-cl".to_string(),
            input: input.to_string(),
            output: output.to_string(),
            rows_read: rows.len(),
            rows_written: groups.len(),
            skipped: 0,
            tiers: None,
            collisions: Vec::new(),
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    fn load_taxonomy(&self, local: Option<&Utf8Path>) -> Result<Taxonomy, XmapError> {
        let taxonomy = match local {
            Some(path) => load_taxonomy_file(&self.layout.resolve(path))?,
            None => self.taxonomy.fetch(&self.layout.taxonomy_url)?,
        };
        if taxonomy.annotations.is_empty() {
            warn!("taxonomy has no annotations; every label will be unresolved");
        }
        Ok(taxonomy)
    }

    fn path_or(&self, given: Option<&Utf8Path>, default: Utf8PathBuf) -> Utf8PathBuf {
        match given {
            Some(path) => self.layout.resolve(path),
            None => default,
        }
    }
}
