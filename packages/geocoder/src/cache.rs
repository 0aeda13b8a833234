//! Per-run reverse-geocode cache keyed by rounded coordinates.

use std::collections::BTreeMap;

/// Cache key for a point: both coordinates rounded to six decimals.
#[must_use]
pub fn coordinate_key(lon: f64, lat: f64) -> String {
    format!("{lon:.6},{lat:.6}")
}

/// Labels resolved during the current run, failures included (as empty
/// labels). Never persisted.
#[derive(Debug, Default)]
pub struct GeocodeCache {
    entries: BTreeMap<String, String>,
}

impl GeocodeCache {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the cached label for `(lon, lat)`, if any.
    #[must_use]
    pub fn get(&self, lon: f64, lat: f64) -> Option<&str> {
        self.entries
            .get(&coordinate_key(lon, lat))
            .map(String::as_str)
    }

    /// Stores `label` for `(lon, lat)`.
    pub fn insert(&mut self, lon: f64, lat: f64, label: String) {
        self.entries.insert(coordinate_key(lon, lat), label);
    }

    /// Number of distinct points cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
