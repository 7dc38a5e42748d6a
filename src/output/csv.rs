// src/output/csv.rs
//! CSV output

use crate::types::MonitoredDomain;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct CsvRow<'a> {
    domain: &'a str,
    port: u16,
    common_name: &'a str,
    valid_from: String,
    valid_until: String,
    days_remaining: Option<i64>,
    status: &'a str,
    last_checked_at: String,
    next_check_at: String,
    check_frequency: &'a str,
    notified: bool,
    /// Semicolon separated
    emails: String,
}

impl<'a> From<&'a MonitoredDomain> for CsvRow<'a> {
    fn from(record: &'a MonitoredDomain) -> Self {
        Self {
            domain: &record.domain,
            port: record.port,
            common_name: &record.common_name,
            valid_from: record.valid_from.map(|d| d.to_string()).unwrap_or_default(),
            valid_until: record.valid_until.map(|d| d.to_string()).unwrap_or_default(),
            days_remaining: record.days_remaining,
            status: record.status.map(|s| s.as_str()).unwrap_or(""),
            last_checked_at: record
                .last_checked_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            next_check_at: record.next_check_at.to_rfc3339(),
            check_frequency: record.check_frequency.as_str(),
            notified: record.notified,
            emails: record.custom_emails.join(";"),
        }
    }
}

/// Header row followed by one row per record
pub fn write_records<W: Write>(writer: &mut W, records: &[MonitoredDomain]) -> anyhow::Result<()> {
    let mut csv_writer = ::csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(CsvRow::from(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}
