#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetching parking posts from the municipal `ArcGIS` feature service and
//! projecting their geometry to WGS84.
//!
//! The network-facing pieces sit behind the [`FeatureSource`] and
//! [`PointProjector`] traits; the paging and batching logic in
//! [`arcgis::fetch_all_features`] and [`projection::project_points`] only
//! talks to those traits.

pub mod arcgis;
pub mod http;
pub mod progress;
pub mod projection;
pub mod retry;

use async_trait::async_trait;
use snow_posts_models::{Feature, Point};

/// Errors that can occur while talking to the `ArcGIS` services.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The service answered with an `ArcGIS` error envelope.
    #[error("ArcGIS service error {code}: {message}")]
    Service {
        /// Error code reported by the service.
        code: i64,
        /// Error message reported by the service.
        message: String,
    },

    /// The projection endpoint returned a different number of points than
    /// it was sent.
    #[error("projection returned {received} points for {sent} inputs")]
    Projection {
        /// Points sent in the batch.
        sent: usize,
        /// Points received back.
        received: usize,
    },

    /// Unexpected response shape.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

/// One page of the feature service.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Fetches up to `limit` features starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request or response parsing fails.
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Feature>, SourceError>;
}

/// One batch of the geometry projection service.
#[async_trait]
pub trait PointProjector: Send + Sync {
    /// Projects `points` and returns them in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request or response parsing fails.
    async fn project_batch(&self, points: &[Point]) -> Result<Vec<Point>, SourceError>;
}
