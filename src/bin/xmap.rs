use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cellset_xmap::app::{App, Bg2WmbOptions, ProgressSink, ReportOptions, TableResult};
use cellset_xmap::config::ConfigLoader;
use cellset_xmap::domain::{CellStyle, ExportKind, NamedQuery, Taxonomy};
use cellset_xmap::error::XmapError;
use cellset_xmap::graph::{
    Credentials, DryRunGraph, GraphQuery, Neo4jBoltClient, Params, parse_params,
};
use cellset_xmap::index::IndexPolicy;
use cellset_xmap::output::{HumanOutput, JsonOutput, OutputMode};
use cellset_xmap::sheet::{DEFAULT_SHEET_GID, DEFAULT_SHEET_ID, SheetClient, SheetHttpClient};
use cellset_xmap::taxonomy::{TaxonomyClient, TaxonomyHttpClient};

#[derive(Parser)]
#[command(name = "xmap")]
#[command(about = "Cross-map BG, WHB and WMB cell-type taxonomies into ROBOT templates and reports")]
#[command(version, author)]
struct Cli {
    /// Project root that default input and output paths hang off.
    #[arg(long, global = true, default_value = ".")]
    root: Utf8PathBuf,

    /// JSON config file (defaults to <root>/xmap.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print the job result as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build the BG to WMB mapping template")]
    Bg2wmb(Bg2WmbArgs),
    #[command(about = "Build the WHB to WMB homology template")]
    Whb2wmb(Whb2WmbArgs),
    #[command(about = "Download the consensus homology sheet as CSV")]
    FetchSheet(FetchSheetArgs),
    #[command(about = "Run a named graph query and write CSV and Markdown reports")]
    Report(ReportArgs),
    #[command(about = "Run a Cypher export and write it as TSV")]
    Export(ExportArgs),
    #[command(about = "Convert a similarity matrix into a long r/c/score table")]
    Melt(MeltArgs),
    #[command(about = "Group cell types by curated Cell Ontology term")]
    AggregateCl(AggregateClArgs),
}

#[derive(Args)]
struct Bg2WmbArgs {
    #[arg(long)]
    input: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Read the taxonomy from a local JSON file instead of the configured URL.
    #[arg(long)]
    taxonomy: Option<Utf8PathBuf>,

    #[arg(long, default_value = "subclass")]
    subclass_labelset: String,

    /// Fail when two taxonomy entries share a label.
    #[arg(long)]
    strict_labels: bool,
}

#[derive(Args)]
struct Whb2WmbArgs {
    #[arg(long)]
    input: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct FetchSheetArgs {
    #[arg(long, default_value = DEFAULT_SHEET_ID)]
    sheet_id: String,

    #[arg(long, default_value = DEFAULT_SHEET_GID)]
    gid: String,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long, default_value = "REPORT_BG_MAPPINGS")]
    query: String,

    /// Query parameters as a JSON object or a path to a JSON file.
    #[arg(long)]
    args: Option<String>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Use a fixed mock record set instead of connecting to Neo4j.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, value_enum, default_value_t = CellStyle::Multiline)]
    cell_style: CellStyle,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(value_enum)]
    kind: ExportKind,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,
}

#[derive(Args)]
struct MeltArgs {
    input: Utf8PathBuf,

    output: Utf8PathBuf,

    #[arg(long)]
    min_score: Option<f64>,
}

#[derive(Args)]
struct AggregateClArgs {
    input: Utf8PathBuf,

    output: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<XmapError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &XmapError) -> u8 {
    match error {
        XmapError::TaxonomyHttp(_)
        | XmapError::TaxonomyStatus { .. }
        | XmapError::SheetHttp(_)
        | XmapError::SheetStatus { .. } => 3,
        XmapError::GraphConnection { .. } | XmapError::GraphQuery(_) => 4,
        XmapError::UnknownQuery(_) | XmapError::QueryArgs(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let layout = ConfigLoader::resolve(cli.root, cli.config.as_deref())?;

    match cli.command {
        Commands::Bg2wmb(args) => {
            if args.taxonomy.is_some() {
                run_bg2wmb(App::new(layout, NopTaxonomy, NopSheet), args, output_mode)
            } else {
                let taxonomy = TaxonomyHttpClient::new()?;
                run_bg2wmb(App::new(layout, taxonomy, NopSheet), args, output_mode)
            }
        }
        Commands::Whb2wmb(args) => {
            let app = App::new(layout, NopTaxonomy, NopSheet);
            let sink = progress_sink(output_mode);
            let result = app.whb2wmb(args.input.as_deref(), args.output.as_deref(), sink)?;
            print_table(&result, output_mode)
        }
        Commands::FetchSheet(args) => {
            let app = App::new(layout, NopTaxonomy, SheetHttpClient::new()?);
            let sink = progress_sink(output_mode);
            let result =
                app.fetch_sheet(&args.sheet_id, &args.gid, args.output.as_deref(), sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_sheet(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_sheet(&result),
            }
            Ok(())
        }
        Commands::Report(args) => {
            run_report(App::new(layout, NopTaxonomy, NopSheet), args, output_mode)
        }
        Commands::Export(args) => {
            let app = App::new(layout, NopTaxonomy, NopSheet);
            let endpoint = args
                .endpoint
                .unwrap_or_else(|| app.layout().neo4j_endpoint.clone());
            let graph = Neo4jBoltClient::connect(
                &endpoint,
                Credentials::from_parts(args.user, args.password),
            )?;
            let sink = progress_sink(output_mode);
            let result = app.export(&graph, args.kind, args.output.as_deref(), sink)?;
            print_table(&result, output_mode)
        }
        Commands::Melt(args) => {
            let app = App::new(layout, NopTaxonomy, NopSheet);
            let sink = progress_sink(output_mode);
            let result = app.melt(&args.input, &args.output, args.min_score, sink)?;
            print_table(&result, output_mode)
        }
        Commands::AggregateCl(args) => {
            let app = App::new(layout, NopTaxonomy, NopSheet);
            let sink = progress_sink(output_mode);
            let result = app.aggregate_cl(&args.input, &args.output, sink)?;
            print_table(&result, output_mode)
        }
    }
}

fn run_bg2wmb<T: TaxonomyClient, S: SheetClient>(
    app: App<T, S>,
    args: Bg2WmbArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let options = Bg2WmbOptions {
        input: args.input,
        output: args.output,
        taxonomy_file: args.taxonomy,
        subclass_labelset: args.subclass_labelset,
        policy: if args.strict_labels {
            IndexPolicy::RejectCollisions
        } else {
            IndexPolicy::LastWins
        },
    };
    let result = app.bg2wmb(options, progress_sink(output_mode))?;
    print_table(&result, output_mode)
}

fn run_report<T: TaxonomyClient, S: SheetClient>(
    app: App<T, S>,
    args: ReportArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let query: NamedQuery = args.query.parse()?;
    let params = match args.args.as_deref() {
        Some(raw) => parse_params(raw)?,
        None => Params::new(),
    };
    let options = ReportOptions {
        query,
        params,
        output: args.output,
        cell_style: args.cell_style,
        dry_run: args.dry_run,
    };

    let graph: Box<dyn GraphQuery> = if args.dry_run {
        Box::new(DryRunGraph)
    } else {
        let endpoint = args
            .endpoint
            .unwrap_or_else(|| app.layout().neo4j_endpoint.clone());
        Box::new(Neo4jBoltClient::connect(
            &endpoint,
            Credentials::from_parts(args.user, args.password),
        )?)
    };

    let result = app.report(graph.as_ref(), options, progress_sink(output_mode))?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_report(&result),
    }
    Ok(())
}

fn print_table(result: &TableResult, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_table(result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_table(result),
    }
    Ok(())
}

fn progress_sink(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &HumanOutput,
    }
}

struct NopTaxonomy;
struct NopSheet;

impl TaxonomyClient for NopTaxonomy {
    fn fetch(&self, _url: &str) -> Result<Taxonomy, XmapError> {
        Err(XmapError::TaxonomyHttp(
            "taxonomy client not configured".to_string(),
        ))
    }
}

impl SheetClient for NopSheet {
    fn export_csv(&self, _sheet_id: &str, _gid: &str) -> Result<Vec<u8>, XmapError> {
        Err(XmapError::SheetHttp(
            "spreadsheet client not configured".to_string(),
        ))
    }
}
