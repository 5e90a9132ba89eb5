use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum XmapError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("taxonomy request failed: {0}")]
    TaxonomyHttp(String),

    #[error("taxonomy endpoint returned status {status}: {message}")]
    TaxonomyStatus { status: u16, message: String },

    #[error("failed to parse taxonomy JSON: {0}")]
    TaxonomyParse(String),

    #[error("spreadsheet request failed: {0}")]
    SheetHttp(String),

    #[error("spreadsheet endpoint returned status {status}: {message}")]
    SheetStatus { status: u16, message: String },

    #[error("failed to connect to Neo4j at {endpoint}: {message}")]
    #[diagnostic(help("check that the bolt endpoint is reachable and the credentials are valid"))]
    GraphConnection { endpoint: String, message: String },

    #[error("Neo4j query failed: {0}")]
    GraphQuery(String),

    #[error("query '{0}' not found in the named query catalog")]
    #[diagnostic(help("known queries: REPORT_BG_MAPPINGS"))]
    UnknownQuery(String),

    #[error("invalid query arguments: {0}")]
    QueryArgs(String),

    #[error("failed to read input {path}: {message}")]
    InputRead { path: String, message: String },

    #[error("input {path} is missing required column '{column}'")]
    MissingColumn { path: String, column: String },

    #[error("label '{label}' maps to both {kept} and {displaced}")]
    LabelCollision {
        label: String,
        kept: String,
        displaced: String,
    },

    #[error("invalid similarity matrix: {0}")]
    InvalidMatrix(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
