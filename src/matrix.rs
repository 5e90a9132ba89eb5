use std::cmp::Ordering;
use std::io::{Read, Write};

use serde::Serialize;

use crate::domain::is_missing;
use crate::error::XmapError;

pub const DEFAULT_MIN_SCORE: f64 = 0.1;

/// One (row label, column label, score) triple of a melted similarity matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPair {
    pub r: String,
    pub c: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    /// Row-major; `None` for blank cells.
    pub scores: Vec<Vec<Option<f64>>>,
}

impl SimilarityMatrix {
    /// Reads a tab-separated matrix whose first row names the columns and whose
    /// first column names the rows. The header row may omit the corner cell.
    pub fn read<R: Read>(input: R) -> Result<Self, XmapError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(input);

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record.map_err(|err| XmapError::InvalidMatrix(err.to_string()))?,
            None => return Err(XmapError::InvalidMatrix("matrix is empty".to_string())),
        };

        let mut row_labels = Vec::new();
        let mut scores = Vec::new();
        for (line, record) in records.enumerate() {
            let record = record.map_err(|err| XmapError::InvalidMatrix(err.to_string()))?;
            let mut cells = record.iter();
            let Some(label) = cells.next() else {
                continue;
            };
            let row = cells
                .enumerate()
                .map(|(col, cell)| parse_score(cell, line + 2, col + 2))
                .collect::<Result<Vec<_>, _>>()?;
            row_labels.push(label.to_string());
            scores.push(row);
        }

        let width = scores.first().map(Vec::len).unwrap_or(0);
        let column_labels: Vec<String> = if header.len() == width {
            header.iter().map(str::to_string).collect()
        } else {
            header.iter().skip(1).map(str::to_string).collect()
        };
        if column_labels.len() != width {
            return Err(XmapError::InvalidMatrix(format!(
                "header names {} columns but rows carry {width} scores",
                column_labels.len()
            )));
        }
        if let Some(index) = scores.iter().position(|row| row.len() != width) {
            return Err(XmapError::InvalidMatrix(format!(
                "row '{}' has {} scores, expected {width}",
                row_labels[index],
                scores[index].len()
            )));
        }

        Ok(Self {
            row_labels,
            column_labels,
            scores,
        })
    }

    /// Long format, column by column, keeping scores `>= min_score` rounded to
    /// two decimals and sorted by descending score.
    pub fn melt(&self, min_score: f64) -> Vec<ScoredPair> {
        let mut pairs = Vec::new();
        for (col, column_label) in self.column_labels.iter().enumerate() {
            for (row, row_label) in self.row_labels.iter().enumerate() {
                let Some(score) = self.scores[row][col] else {
                    continue;
                };
                if score >= min_score {
                    pairs.push(ScoredPair {
                        r: row_label.clone(),
                        c: column_label.clone(),
                        score: round2(score),
                    });
                }
            }
        }
        pairs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        pairs
    }
}

fn parse_score(cell: &str, line: usize, column: usize) -> Result<Option<f64>, XmapError> {
    let cell = cell.trim();
    if is_missing(cell) {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| {
        XmapError::InvalidMatrix(format!(
            "non-numeric score '{cell}' at line {line}, column {column}"
        ))
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.1}")
    } else {
        format!("{score}")
    }
}

pub fn write_long<W: Write>(pairs: &[ScoredPair], out: W) -> Result<(), XmapError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    writer
        .write_record(["r", "c", "score"])
        .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    for pair in pairs {
        writer
            .write_record([
                pair.r.as_str(),
                pair.c.as_str(),
                format_score(pair.score).as_str(),
            ])
            .map_err(|err| XmapError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| XmapError::Filesystem(err.to_string()))
}
