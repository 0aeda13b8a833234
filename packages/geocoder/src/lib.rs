#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding of WGS84 points to street labels.
//!
//! [`arcgis_reverse`] talks to the `ArcGIS` World `GeocodeServer`.
//! [`resolver::LabelResolver`] wraps any [`ReverseGeocoder`] with the
//! per-run coordinate cache, bounded retry and an optional delay between
//! lookups. Lookups never fail a run: once retries are exhausted the label
//! is empty.

pub mod arcgis_reverse;
pub mod cache;
pub mod resolver;

use async_trait::async_trait;
use snow_posts_source::SourceError;
use thiserror::Error;

/// Errors from reverse geocoding.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Request failed or the body was not JSON.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

/// A single reverse-geocode attempt.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolves `(lon, lat)` to a street label. An empty string means the
    /// service knows no address there.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] on transport or parse failures.
    async fn reverse(&self, lon: f64, lat: f64) -> Result<String, GeocodeError>;
}
