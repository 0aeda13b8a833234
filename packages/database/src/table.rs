//! Header-preserving CSV table.
//!
//! Used by the repair pipeline, which must write back every column in the
//! order it was read, including columns it does not know about.

use std::path::Path;

use crate::{DbError, write_atomic};

/// A CSV file held in memory: header plus raw records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Creates a table from a header and rows.
    #[must_use]
    pub const fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Reads `path`. The first line is the header; records may be shorter
    /// or longer than the header and are kept as-is.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file cannot be opened or parsed.
    pub fn read(path: &Path) -> Result<Self, DbError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(String::from).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(Self { headers, rows })
    }

    /// Writes the header and every row to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), DbError> {
        write_atomic(path, |writer| {
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            Ok(())
        })
    }

    /// Column names in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Records in file order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Index of `name` in the header.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like [`Self::column`] but fails when the column is absent.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MissingColumn`] naming `path` for context.
    pub fn require_column(&self, name: &str, path: &Path) -> Result<usize, DbError> {
        self.column(name).ok_or_else(|| DbError::MissingColumn {
            column: name.to_string(),
            path: path.display().to_string(),
        })
    }

    /// Cell `column` of row `row`, if the record is long enough.
    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Overwrites cell `column` of row `row`, padding a short record with
    /// empty cells up to the header width.
    pub fn set_cell(&mut self, row: usize, column: usize, value: String) {
        let width = self.headers.len().max(column + 1);
        if let Some(record) = self.rows.get_mut(row) {
            if record.len() <= column {
                record.resize(width, String::new());
            }
            record[column] = value;
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
