// src/output/json.rs
//! JSON Lines (JSONL) output

use crate::types::MonitoredDomain;
use std::io::Write;

/// One JSON object per record, one per line
pub fn write_records<W: Write>(writer: &mut W, records: &[MonitoredDomain]) -> anyhow::Result<()> {
    for record in records {
        let json = serde_json::to_string(record)?;
        writeln!(writer, "{}", json)?;
    }
    writer.flush()?;
    Ok(())
}
