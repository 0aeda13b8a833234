//! Rows resolved by a previous run, keyed by `OBJECTID`.
//!
//! The sync pipeline consults a [`RowStore`] before projecting or
//! geocoding a post; a hit is reused verbatim.

use std::collections::BTreeMap;
use std::path::Path;

use snow_posts_models::ResolvedRow;

use crate::DbError;
use crate::output::read_output;

/// Key-value store of previously resolved rows.
pub trait RowStore {
    /// Returns the resolved row for `object_id`, if one was stored.
    fn get(&self, object_id: &str) -> Option<&ResolvedRow>;

    /// Stores `row` under `object_id`, replacing any previous value.
    fn insert(&mut self, object_id: String, row: ResolvedRow);

    /// Number of stored rows.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`RowStore`] held in a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowStore {
    rows: BTreeMap<String, ResolvedRow>,
}

impl MemoryRowStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl RowStore for MemoryRowStore {
    fn get(&self, object_id: &str) -> Option<&ResolvedRow> {
        self.rows.get(object_id)
    }

    fn insert(&mut self, object_id: String, row: ResolvedRow) {
        self.rows.insert(object_id, row);
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// [`RowStore`] loaded from the previously published CSV.
#[derive(Debug, Clone, Default)]
pub struct CsvRowStore {
    inner: MemoryRowStore,
}

impl CsvRowStore {
    /// Loads every row of `path`. A missing file gives an empty store; when
    /// an `OBJECTID` appears twice the last row wins.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the file exists but cannot be read.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let mut inner = MemoryRowStore::new();
        if !path.exists() {
            log::info!("No previous output at {}; starting fresh", path.display());
            return Ok(Self { inner });
        }
        for row in read_output(path)? {
            inner.insert(row.objectid.clone(), row.resolved());
        }
        log::info!(
            "Loaded {} previously resolved posts from {}",
            inner.len(),
            path.display()
        );
        Ok(Self { inner })
    }
}

impl RowStore for CsvRowStore {
    fn get(&self, object_id: &str) -> Option<&ResolvedRow> {
        self.inner.get(object_id)
    }

    fn insert(&mut self, object_id: String, row: ResolvedRow) {
        self.inner.insert(object_id, row);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
