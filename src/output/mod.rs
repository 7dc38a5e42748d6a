// src/output/mod.rs
//! Rendering of stored domain records for the `list` command
//!
//! Human-readable colored text, JSON Lines and CSV.

use crate::types::MonitoredDomain;
use std::io::Write;

pub mod csv;
pub mod human;
pub mod json;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable colored text output (default)
    Human,
    /// JSON Lines format (one JSON object per line)
    Json,
    /// CSV format
    Csv,
}

/// Write `records` to `writer` in `format`
pub fn write_records<W: Write>(
    writer: &mut W,
    records: &[MonitoredDomain],
    format: OutputFormat,
    use_colors: bool,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Human => human::write_records(writer, records, use_colors),
        OutputFormat::Json => json::write_records(writer, records),
        OutputFormat::Csv => csv::write_records(writer, records),
    }
}
