use std::fs;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use cellset_xmap::app::{App, Bg2WmbOptions, ReportOptions};
use cellset_xmap::config::ProjectLayout;
use cellset_xmap::domain::{AnnotationEntry, CellStyle, ExportKind, NamedQuery, Taxonomy};
use cellset_xmap::error::XmapError;
use cellset_xmap::graph::{DryRunGraph, GraphQuery, Params, Record};
use cellset_xmap::index::IndexPolicy;
use cellset_xmap::output::JsonOutput;
use cellset_xmap::sheet::SheetClient;
use cellset_xmap::taxonomy::TaxonomyClient;

struct MockTaxonomy {
    taxonomy: Taxonomy,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockTaxonomy {
    fn new(entries: &[(&str, &str, &str)]) -> Self {
        let annotations = entries
            .iter()
            .map(|(label, accession, labelset)| AnnotationEntry {
                cell_label: label.to_string(),
                cell_set_accession: accession.to_string(),
                labelset: labelset.to_string(),
            })
            .collect();
        Self {
            taxonomy: Taxonomy { annotations },
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl TaxonomyClient for MockTaxonomy {
    fn fetch(&self, url: &str) -> Result<Taxonomy, XmapError> {
        self.requested.lock().unwrap().push(url.to_string());
        Ok(self.taxonomy.clone())
    }
}

struct MockSheet {
    body: Vec<u8>,
}

impl SheetClient for MockSheet {
    fn export_csv(&self, _sheet_id: &str, _gid: &str) -> Result<Vec<u8>, XmapError> {
        Ok(self.body.clone())
    }
}

struct FailingSheet;

impl SheetClient for FailingSheet {
    fn export_csv(&self, _sheet_id: &str, _gid: &str) -> Result<Vec<u8>, XmapError> {
        Err(XmapError::SheetStatus {
            status: 404,
            message: "not found".to_string(),
        })
    }
}

struct FixedGraph {
    records: Vec<Record>,
}

impl GraphQuery for FixedGraph {
    fn run_query(&self, _cypher: &str, _params: &Params) -> Result<Vec<Record>, XmapError> {
        Ok(self.records.clone())
    }
}

fn astro_taxonomy() -> MockTaxonomy {
    MockTaxonomy::new(&[
        ("Astro", "AST-001", "subclass"),
        ("10 Astro_1", "AST-001a", "supertype"),
        ("11 Astro_2", "AST-001b", "supertype"),
    ])
}

fn layout(temp: &tempfile::TempDir) -> ProjectLayout {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    ProjectLayout::with_root(root)
}

fn write(path: &Utf8Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn bg2wmb_writes_template_for_astro_scenario() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.bg2wmb_input(),
        "Group,accession_group,curated_ABC_WMB_supertype,curated_ABC_WMB_cluster,curated_ABC_WMB_subclass\n\
         NeuronA,CS_BG_1,10 Astro_1 | 11 Astro_2,,5 Astro\n\
         NeuronB,CS_BG_2,Unknown,,\n",
    );
    let template = layout.bg2wmb_template();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let result = app
        .bg2wmb(Bg2WmbOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.rows_read, 2);
    assert_eq!(result.rows_written, 2);
    let tiers = result.tiers.unwrap();
    assert_eq!(tiers.exact, 1);
    assert_eq!(tiers.related, 1);
    assert_eq!(tiers.broad, 0);

    let content = fs::read_to_string(&template).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        "Group\tType\taccession_group\texact_match\trelated_match\tbroad_match"
    );
    assert_eq!(
        lines[1],
        "\tTYPE\tID\tAI skos:exactMatch SPLIT=|\tAI skos:relatedMatch SPLIT=|\tAI skos:broadMatch SPLIT=|"
    );
    assert_eq!(
        lines[2],
        "NeuronA\towl:NamedIndividual\tBG:CS_BG_1\tWMB:AST-001\tWMB:AST-001a|WMB:AST-001b\t"
    );
    assert_eq!(lines[3], "NeuronB\towl:NamedIndividual\tBG:CS_BG_2\t\t\t");
}

#[test]
fn bg2wmb_skips_rows_without_accession_group() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.bg2wmb_input(),
        "Group,accession_group,curated_ABC_WMB_supertype,curated_ABC_WMB_subclass\n\
         NeuronA,CS_BG_1,,5 Astro\n\
         NeuronB,,,5 Astro\n\
         NeuronC,NA,,5 Astro\n\
         ,,,\n",
    );
    let template = layout.bg2wmb_template();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let result = app
        .bg2wmb(Bg2WmbOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.rows_read, 4);
    assert_eq!(result.rows_written, 1);
    assert_eq!(result.skipped, 3);
    let content = fs::read_to_string(&template).unwrap();
    assert_eq!(content.lines().count(), 3);
    assert!(!content.contains("NeuronB"));
    assert!(!content.contains("BG:NA"));
}

#[test]
fn bg2wmb_fetches_configured_taxonomy_url() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.bg2wmb_input(),
        "Group,accession_group,curated_ABC_WMB_supertype,curated_ABC_WMB_subclass\n",
    );
    let url = layout.taxonomy_url.clone();
    let taxonomy = astro_taxonomy();
    let requested = Arc::clone(&taxonomy.requested);
    let app = App::new(layout, taxonomy, FailingSheet);

    let result = app.bg2wmb(Bg2WmbOptions::default(), &JsonOutput).unwrap();
    assert_eq!(result.rows_read, 0);
    assert_eq!(*requested.lock().unwrap(), vec![url]);
}

#[test]
fn bg2wmb_prefers_local_taxonomy_file() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.bg2wmb_input(),
        "Group,accession_group,curated_ABC_WMB_supertype,curated_ABC_WMB_subclass\n\
         NeuronA,CS_BG_1,10 Astro_1,\n",
    );
    let local = layout.root.join("taxonomy.json");
    write(
        &local,
        r#"{"annotations": [{"cell_label": "10 Astro_1", "cell_set_accession": "AST-LOCAL", "labelset": "supertype"}]}"#,
    );
    let template = layout.bg2wmb_template();
    let taxonomy = MockTaxonomy::new(&[]);
    let requested = Arc::clone(&taxonomy.requested);
    let app = App::new(layout, taxonomy, FailingSheet);

    let options = Bg2WmbOptions {
        taxonomy_file: Some(Utf8PathBuf::from("taxonomy.json")),
        ..Bg2WmbOptions::default()
    };
    app.bg2wmb(options, &JsonOutput).unwrap();

    assert!(requested.lock().unwrap().is_empty());
    let content = fs::read_to_string(&template).unwrap();
    assert!(content.contains("BG:CS_BG_1\tWMB:AST-LOCAL\t\t"));
}

#[test]
fn bg2wmb_strict_labels_rejects_collisions() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.bg2wmb_input(),
        "Group,accession_group,curated_ABC_WMB_supertype,curated_ABC_WMB_subclass\n",
    );
    let template = layout.bg2wmb_template();
    let taxonomy = MockTaxonomy::new(&[
        ("Astro", "AST-001", "subclass"),
        ("Astro", "AST-999", "subclass"),
    ]);
    let app = App::new(layout, taxonomy, FailingSheet);

    let options = Bg2WmbOptions {
        policy: IndexPolicy::RejectCollisions,
        ..Bg2WmbOptions::default()
    };
    let err = app.bg2wmb(options, &JsonOutput).unwrap_err();
    assert_matches!(err, XmapError::LabelCollision { .. });
    assert!(!template.exists());
}

#[test]
fn bg2wmb_reports_collisions_when_lenient() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.bg2wmb_input(),
        "Group,accession_group,curated_ABC_WMB_supertype,curated_ABC_WMB_subclass\n",
    );
    let taxonomy = MockTaxonomy::new(&[
        ("Astro", "AST-001", "subclass"),
        ("Astro", "AST-999", "subclass"),
    ]);
    let app = App::new(layout, taxonomy, FailingSheet);

    let result = app.bg2wmb(Bg2WmbOptions::default(), &JsonOutput).unwrap();
    assert!(!result.collisions.is_empty());
    assert_eq!(result.collisions[0].kept, "AST-999");
    assert_eq!(result.collisions[0].displaced, "AST-001");
}

#[test]
fn bg2wmb_missing_column_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(&layout.bg2wmb_input(), "Group,accession_group\nA,B\n");
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let err = app.bg2wmb(Bg2WmbOptions::default(), &JsonOutput).unwrap_err();
    assert_matches!(err, XmapError::MissingColumn { column, .. } if column == "curated_ABC_WMB_supertype");
}

#[test]
fn whb2wmb_drops_rows_without_mouse_accession() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.whb2wmb_input(),
        "Human_cell_set_accession\tMouse_accession\tscore\n\
         CS202210140_1\tCS20230722_CLUS_0001\t0.87\n\
         CS202210140_2\t\t0.5\n\
         CS202210140_3\tNA\t0.4\n",
    );
    let template = layout.whb2wmb_template();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let result = app.whb2wmb(None, None, &JsonOutput).unwrap();
    assert_eq!(result.rows_read, 3);
    assert_eq!(result.rows_written, 1);
    assert_eq!(result.skipped, 2);

    let content = fs::read_to_string(&template).unwrap();
    assert_eq!(
        content,
        "ID\tskos:exactMatch\tconfidence_score\n\
         ID\tAI skos:exactMatch\tAI IAO:0000136\n\
         WHB:CS202210140_1\tWMB:CS20230722_CLUS_0001\t0.87\n"
    );
}

#[test]
fn fetch_sheet_stores_body_verbatim() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    let destination = layout.homology_sheet();
    let body = b"Human_cell_set_accession,Mouse_accession,score\r\nA,B,1\r\n".to_vec();
    let app = App::new(layout, astro_taxonomy(), MockSheet { body: body.clone() });

    let result = app.fetch_sheet("sheet", "0", None, &JsonOutput).unwrap();
    assert_eq!(result.bytes, body.len());
    assert!(result.url.ends_with("/d/sheet/export?format=csv&gid=0"));
    assert_eq!(fs::read(&destination).unwrap(), body);
}

#[test]
fn fetch_sheet_propagates_status_errors() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    let destination = layout.homology_sheet();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let err = app.fetch_sheet("sheet", "0", None, &JsonOutput).unwrap_err();
    assert_matches!(err, XmapError::SheetStatus { status: 404, .. });
    assert!(!destination.exists());
}

#[test]
fn dry_run_report_writes_csv_and_markdown() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    let csv = layout.default_report();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let options = ReportOptions {
        query: NamedQuery::ReportBgMappings,
        params: Params::new(),
        output: None,
        cell_style: CellStyle::Multiline,
        dry_run: true,
    };
    let result = app.report(&DryRunGraph, options, &JsonOutput).unwrap();
    assert_eq!(result.rows, 1);
    assert_eq!(result.csv_path.as_deref(), Some(csv.as_str()));

    let content = fs::read_to_string(&csv).unwrap();
    assert!(content.starts_with(
        "\"Group\",\"cl_mappings\",\"WMB_AT\",\"refs\",\"no_cl_mapping\"\r\n"
    ));
    assert!(content.contains("\"supertype: 0123 TEST Supertype\""));

    let markdown = fs::read_to_string(csv.with_extension("md")).unwrap();
    assert!(markdown.contains("## Query"));
    assert!(markdown.contains("```cypher"));
    assert!(!markdown.contains("## Parameters"));
}

#[test]
fn empty_report_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    let csv = layout.default_report();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let options = ReportOptions {
        query: NamedQuery::ReportBgMappings,
        params: Params::new(),
        output: None,
        cell_style: CellStyle::Multiline,
        dry_run: false,
    };
    let graph = FixedGraph {
        records: Vec::new(),
    };
    let result = app.report(&graph, options, &JsonOutput).unwrap();
    assert_eq!(result.rows, 0);
    assert!(result.csv_path.is_none());
    assert!(!csv.exists());
}

#[test]
fn labels_export_reads_cypher_file() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.cypher_file(ExportKind::Labels.cypher_name()),
        "MATCH (n) RETURN n.label AS label, n.curie AS accession",
    );
    let output = layout.mouse_labels_export();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let record = serde_json::json!({"label": "5 Astro", "accession": "CS20230722_SUBC_005"});
    let graph = FixedGraph {
        records: vec![record.as_object().unwrap().clone()],
    };
    let result = app
        .export(&graph, ExportKind::Labels, None, &JsonOutput)
        .unwrap();
    assert_eq!(result.rows_written, 1);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "label\taccession\n5 Astro\tCS20230722_SUBC_005\n"
    );
}

#[test]
fn export_without_cypher_file_fails() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(layout(&temp), astro_taxonomy(), FailingSheet);
    let graph = FixedGraph {
        records: Vec::new(),
    };
    let err = app
        .export(&graph, ExportKind::CellSetMap, None, &JsonOutput)
        .unwrap_err();
    assert_matches!(err, XmapError::InputRead { .. });
}

#[test]
fn melt_and_aggregate_write_tables() {
    let temp = tempfile::tempdir().unwrap();
    let layout = layout(&temp);
    write(
        &layout.root.join("matrix.tsv"),
        "\tm1\tm2\nh1\t0.912\t0.05\nh2\t0.3\t1\n",
    );
    write(
        &layout.root.join("cl.tsv"),
        "cell_type\tcellTypeId_\tcellTypeName_\n5 Astro\tCL:0000127\tastrocyte\n",
    );
    let root = layout.root.clone();
    let app = App::new(layout, astro_taxonomy(), FailingSheet);

    let melted = app
        .melt(
            Utf8Path::new("matrix.tsv"),
            Utf8Path::new("long.tsv"),
            None,
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(melted.rows_written, 3);
    assert_eq!(
        fs::read_to_string(root.join("long.tsv")).unwrap(),
        "r\tc\tscore\nh2\tm2\t1.0\nh1\tm1\t0.91\nh2\tm1\t0.3\n"
    );

    let grouped = app
        .aggregate_cl(Utf8Path::new("cl.tsv"), Utf8Path::new("cl_out.tsv"), &JsonOutput)
        .unwrap();
    assert_eq!(grouped.rows_written, 1);
    assert_eq!(
        fs::read_to_string(root.join("cl_out.tsv")).unwrap(),
        "cellTypeName_\tcell_type\nmm_astrocyte\t\"[\"\"5 Astro\"\"]\"\n"
    );
}
