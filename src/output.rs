use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, ReportResult, SheetResult, TableResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_table(result: &TableResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_sheet(result: &SheetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_report(result: &ReportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr and a short summary on stdout.
pub struct HumanOutput;

impl HumanOutput {
    pub fn print_table(result: &TableResult) {
        println!(
            "{}: {} rows read, {} written, {} skipped -> {}",
            result.job, result.rows_read, result.rows_written, result.skipped, result.output
        );
        if let Some(tiers) = &result.tiers {
            println!(
                "  exact={} related={} broad={}",
                tiers.exact, tiers.related, tiers.broad
            );
        }
        for collision in &result.collisions {
            println!(
                "  label collision '{}': kept {}, displaced {}",
                collision.label, collision.kept, collision.displaced
            );
        }
    }

    pub fn print_sheet(result: &SheetResult) {
        println!("downloaded {} bytes to {}", result.bytes, result.output);
    }

    pub fn print_report(result: &ReportResult) {
        match (&result.csv_path, &result.markdown_path) {
            (Some(csv), Some(markdown)) => {
                println!("{}: {} rows", result.query, result.rows);
                println!("  csv: {csv}");
                println!("  markdown: {markdown}");
            }
            _ => println!("{}: no results returned", result.query),
        }
    }
}

impl ProgressSink for HumanOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
