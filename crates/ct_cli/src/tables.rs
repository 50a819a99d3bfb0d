//! CSV reading and writing for the tabular pipeline inputs and outputs.

use ct_core::{ArticleVersion, ChangeRecord, Error, Result, VersionUpdate};
use serde::Serialize;
use std::path::Path;

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> Error + '_ {
    move |e| Error::Input(format!("{}: {}", path.display(), e))
}

/// Reads article versions. Stored tables carry an `article_id` column,
/// scraped tables may leave it out.
pub fn read_versions(path: &Path) -> Result<Vec<ArticleVersion>> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    let mut versions = Vec::new();
    for row in reader.deserialize::<ArticleVersion>() {
        versions.push(row.map_err(csv_error(path))?);
    }
    Ok(versions)
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T], header: &[&str]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    if rows.is_empty() {
        writer.write_record(header).map_err(csv_error(path))?;
    }
    for row in rows {
        writer.serialize(row).map_err(csv_error(path))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes change records with the change table's column order.
pub fn write_records(path: &Path, records: &[ChangeRecord]) -> Result<()> {
    write_rows(path, records, &ChangeRecord::COLUMNS)
}

pub fn write_versions(path: &Path, updates: &[VersionUpdate]) -> Result<()> {
    write_rows(path, updates, &["article_id", "heading", "body", "scraped_at"])
}
