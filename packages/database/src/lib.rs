#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flat-file storage for the parking-post CSV.
//!
//! - [`table`]: header-preserving read / rewrite of an arbitrary CSV.
//! - [`output`]: the fixed-header published file.
//! - [`row_store`]: rows resolved by a previous run, keyed by `OBJECTID`.
//!
//! Every write goes to a sibling temporary file that is then renamed over
//! the target, so an interrupted run leaves the previous file in place.
//! Records end in `\r\n`.

pub mod output;
pub mod row_store;
pub mod table;

use std::io::Write;
use std::path::{Path, PathBuf};

/// Errors that can occur while reading or writing CSV files.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// CSV parse or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required column is absent from the header.
    #[error("Missing column {column} in {path}")]
    MissingColumn {
        /// Column name.
        column: String,
        /// File that was read.
        path: String,
    },
}

/// Returns the temporary sibling used while rewriting `path`.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes a CSV to `path` through `write`, atomically replacing any
/// existing file.
///
/// The writer never emits a header on its own: `write` writes the header
/// record it wants, then either raw records or serialized rows.
///
/// # Errors
///
/// Returns [`DbError`] if the temporary file cannot be written or renamed.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), DbError>
where
    F: FnOnce(&mut csv::Writer<std::fs::File>) -> Result<(), DbError>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let file = std::fs::File::create(&tmp)?;
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(file);

    let result = write(&mut writer).and_then(|()| {
        writer.flush()?;
        Ok(())
    });
    if let Err(e) = result {
        drop(writer);
        std::fs::remove_file(&tmp).ok();
        return Err(e);
    }
    drop(writer);

    std::fs::rename(&tmp, path)?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}
