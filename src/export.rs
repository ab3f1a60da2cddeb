// src/export.rs

use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::Date;
use tracing::info;

use crate::errors::ExportError;
use crate::table::ShipmentTable;

pub const HEADERS: [&str; 8] = [
    "ITEM",
    "AMOUNT",
    "COST",
    "MEASUREMENT",
    "TOTAL",
    "VENDOR",
    "NOTES",
    "STATUS",
];

/// Write the table as CSV: header, one record per row, then one record per
/// grand total. Every field is quoted.
pub fn write_csv<W: Write>(table: &ShipmentTable, out: W) -> Result<(), ExportError> {
    if table.is_empty() {
        return Err(ExportError::NoData);
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(HEADERS)?;

    for row in table.rows() {
        let line = &row.line;
        let amount = line.amount.to_string();
        writer.write_record([
            line.item.as_str(),
            amount.as_str(),
            line.cost.as_str(),
            line.measurement.as_str(),
            line.rendered_total.as_str(),
            line.vendor.as_str(),
            line.notes.as_str(),
            line.status.as_str(),
        ])?;
    }

    for total in table.grand_totals() {
        writer.write_record([total.label(), "", "", "", total.rendered.as_str(), "", "", ""])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn file_name(prefix: &str, date: Date) -> String {
    // `Date`'s Display is ISO 8601 (YYYY-MM-DD).
    format!("{prefix}_{date}.csv")
}

/// Export into `dir`, naming the file after today's date.
pub fn export_to_dir(table: &ShipmentTable, dir: impl AsRef<Path>, prefix: &str) -> Result<PathBuf, ExportError> {
    if table.is_empty() {
        return Err(ExportError::NoData);
    }
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let today = time::OffsetDateTime::now_utc().date();
    let path = dir.join(file_name(prefix, today));
    let file = std::fs::File::create(&path)?;
    write_csv(table, file)?;

    info!(
        path = %path.display(),
        rows = table.len(),
        totals = table.grand_totals().len(),
        "Data exported"
    );
    Ok(path)
}
