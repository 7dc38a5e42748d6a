// src/output/human.rs
//! Human-readable colored terminal output

use crate::types::{CertStatus, MonitoredDomain};
use colored::Colorize;
use std::io::Write;

fn format_date(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn status_label(record: &MonitoredDomain) -> String {
    record
        .status
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| "unchecked".to_string())
}

/// One line per record plus an indented detail line
pub fn write_records<W: Write>(
    writer: &mut W,
    records: &[MonitoredDomain],
    use_colors: bool,
) -> anyhow::Result<()> {
    for record in records {
        let target = format!("{}:{}", record.domain, record.port);
        let days = record
            .days_remaining
            .map(|d| format!("{} days", d))
            .unwrap_or_else(|| "-".to_string());
        let status = status_label(record);

        if use_colors {
            let status = match record.status {
                Some(CertStatus::Valid) => status.green().bold(),
                Some(CertStatus::Expiring) => status.yellow().bold(),
                Some(CertStatus::Expired) => status.red().bold(),
                None => status.dimmed(),
            };
            writeln!(writer, "{} {} {}", target.cyan().bold(), status, days)?;
            writeln!(
                writer,
                "    {} {}  {} {}  {} {}",
                "CN:".dimmed(),
                record.common_name,
                "Expires:".dimmed(),
                format_date(record.valid_until),
                "Next check:".dimmed(),
                record.next_check_at.format("%Y-%m-%d %H:%M:%S")
            )?;
        } else {
            writeln!(writer, "{} {} {}", target, status, days)?;
            writeln!(
                writer,
                "    CN: {}  Expires: {}  Next check: {}",
                record.common_name,
                format_date(record.valid_until),
                record.next_check_at.format("%Y-%m-%d %H:%M:%S")
            )?;
        }

        if record.notified {
            writeln!(writer, "    Alert sent for this validity window")?;
        }
    }

    writer.flush()?;
    Ok(())
}
