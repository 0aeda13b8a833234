//! The published CSV with its fixed, positional header.

use std::path::Path;

use snow_posts_models::{OUTPUT_HEADER, OutputRow};

use crate::{DbError, write_atomic};

/// Writes `rows` under the fixed header, replacing `path` atomically. The
/// header is written even when there are no rows.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be written.
pub fn write_output(path: &Path, rows: &[OutputRow]) -> Result<(), DbError> {
    write_atomic(path, |writer| {
        writer.write_record(OUTPUT_HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        Ok(())
    })
}

/// Reads a previously published file. Columns are matched by name, so
/// extra columns are ignored and missing ones read as empty.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be opened or a record cannot be
/// decoded.
pub fn read_output(path: &Path) -> Result<Vec<OutputRow>, DbError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let rows = reader
        .deserialize::<OutputRow>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
