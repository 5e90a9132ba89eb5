use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::domain::CellStyle;
use crate::error::XmapError;
use crate::fs_util::write_atomic;
use crate::graph::{Params, Record};

const CELL_BREAK: &str = "\r\n";

/// Columns in first-seen order across all records.
pub fn collect_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|column| column == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Flattens a value into a single spreadsheet-friendly cell.
pub fn multiline_cell(value: &Value) -> String {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => items
            .iter()
            .filter_map(Value::as_object)
            .map(mapping_line)
            .collect::<Vec<_>>()
            .join(CELL_BREAK),
        Value::Object(entries) => entries
            .iter()
            .map(|(key, value)| format!("{key}: {}", scalar_text(value)))
            .collect::<Vec<_>>()
            .join(CELL_BREAK),
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(CELL_BREAK),
        other => scalar_text(other),
    }
}

fn mapping_line(entries: &serde_json::Map<String, Value>) -> String {
    let labelset = entries.get("labelset");
    let cell_set = entries.get("cell_set");
    if labelset.is_some() || cell_set.is_some() {
        let text = |value: Option<&Value>| value.map(scalar_text).unwrap_or_default();
        return format!("{}: {}", text(labelset), text(cell_set));
    }
    entries
        .iter()
        .map(|(key, value)| format!("{key}: {}", scalar_text(value)))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn compact_json_cell(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => value.to_string(),
        other => scalar_text(other),
    }
}

/// Pretty JSON for nested values with `<br>` line breaks and `&nbsp;` indentation.
pub fn markdown_cell(value: &Value) -> String {
    let text = match value {
        Value::Array(_) | Value::Object(_) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            pretty
                .lines()
                .map(|line| line.replace(' ', "&nbsp;"))
                .collect::<Vec<_>>()
                .join("<br>")
        }
        other => scalar_text(other).replace(['\r', '\n'], " "),
    };
    text.replace('|', "\\|")
}

pub fn write_csv<W: Write>(records: &[Record], style: CellStyle, out: W) -> Result<(), XmapError> {
    let columns = collect_columns(records);
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::CRLF)
        .from_writer(out);
    writer
        .write_record(&columns)
        .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    for record in records {
        let row = columns.iter().map(|column| match record.get(column) {
            Some(value) => match style {
                CellStyle::Multiline => multiline_cell(value),
                CellStyle::CompactJson => compact_json_cell(value),
            },
            None => String::new(),
        });
        writer
            .write_record(row)
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn render_markdown(records: &[Record], cypher: &str, params: &Params) -> String {
    let columns = collect_columns(records);
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push(format!("| {} |", columns.join(" | ")));
    lines.push(format!("| {} |", vec!["---"; columns.len()].join(" | ")));
    for record in records {
        let cells = columns
            .iter()
            .map(|column| record.get(column).map(markdown_cell).unwrap_or_default())
            .collect::<Vec<_>>();
        lines.push(format!("| {} |", cells.join(" | ")));
    }

    let mut provenance = vec![
        String::new(),
        "## Query".to_string(),
        String::new(),
        "```cypher".to_string(),
    ];
    provenance.extend(cypher.lines().map(str::to_string));
    provenance.push("```".to_string());

    if !params.is_empty() {
        let pretty = serde_json::to_string_pretty(params).unwrap_or_else(|_| "{}".to_string());
        provenance.push(String::new());
        provenance.push("## Parameters".to_string());
        provenance.push(String::new());
        provenance.push("```json".to_string());
        provenance.push(pretty);
        provenance.push("```".to_string());
    }

    format!("{}\n{}\n", lines.join("\n"), provenance.join("\n"))
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub csv: Utf8PathBuf,
    pub markdown: Utf8PathBuf,
}

impl ReportPaths {
    pub fn for_csv(csv: &Utf8Path) -> Self {
        Self {
            csv: csv.to_path_buf(),
            markdown: csv.with_extension("md"),
        }
    }
}

pub fn write_report(
    records: &[Record],
    cypher: &str,
    params: &Params,
    style: CellStyle,
    paths: &ReportPaths,
) -> Result<(), XmapError> {
    write_atomic(&paths.csv, |out| write_csv(records, style, out))?;
    let markdown = render_markdown(records, cypher, params);
    write_atomic(&paths.markdown, |out| {
        out.write_all(markdown.as_bytes())
            .map_err(|err| XmapError::Filesystem(err.to_string()))
    })
}
