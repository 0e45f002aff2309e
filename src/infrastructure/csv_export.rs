// CSV export of the working table with its three header rows
use crate::domain::header::MultiLevelHeader;
use crate::domain::table::MergedTable;
use crate::domain::telemetry::format_export_timestamp;
use anyhow::{Context, Result};
use std::io::Write;

pub fn write_csv<W: Write>(out: W, header: &MultiLevelHeader, table: &MergedTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);

    for row in header.to_flat_rows() {
        writer.write_record(&row).context("Failed to write CSV header")?;
    }

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(format_export_timestamp(row.time_ms));
        record.extend(
            row.values
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record).context("Failed to write CSV row")?;
    }

    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn to_csv_bytes(header: &MultiLevelHeader, table: &MergedTable) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, header, table)?;
    Ok(buffer)
}
