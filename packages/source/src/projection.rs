//! Reprojection of raw post geometry (EPSG:32187) to WGS84 through the
//! `ArcGIS` `GeometryServer/project` operation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use snow_posts_models::Point;

use crate::retry::{RetryPolicy, retry_linear, send_json};
use crate::{PointProjector, SourceError};

/// Configuration for the geometry projection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectionConfig {
    /// `GeometryServer/project` URL.
    pub url: String,
    /// Spatial reference of the raw geometry.
    #[serde(default = "default_in_sr")]
    pub in_sr: u32,
    /// Target spatial reference.
    #[serde(default = "default_out_sr")]
    pub out_sr: u32,
    /// Points sent per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-request timeout. No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retry policy for projection requests.
    #[serde(default = "RetryPolicy::single_attempt")]
    pub retry: RetryPolicy,
}

const fn default_in_sr() -> u32 {
    32187
}

const fn default_out_sr() -> u32 {
    4326
}

const fn default_batch_size() -> usize {
    200
}

/// [`PointProjector`] backed by an `ArcGIS` geometry service.
pub struct ArcGisProjector {
    client: reqwest::Client,
    config: ProjectionConfig,
}

impl ArcGisProjector {
    /// Creates a projector that posts to `config.url` with `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client, config: ProjectionConfig) -> Self {
        Self { client, config }
    }

    fn batch_request(&self, points: &[Point]) -> reqwest::RequestBuilder {
        let geometries = serde_json::json!({
            "geometryType": "esriGeometryPoint",
            "geometries": points,
        });
        let form = [
            ("f", "json".to_string()),
            ("inSR", self.config.in_sr.to_string()),
            ("outSR", self.config.out_sr.to_string()),
            ("geometries", geometries.to_string()),
        ];
        let mut request = self.client.post(&self.config.url).form(&form);
        if let Some(secs) = self.config.timeout_secs {
            request = request.timeout(Duration::from_secs(secs));
        }
        request
    }
}

#[async_trait]
impl PointProjector for ArcGisProjector {
    async fn project_batch(&self, points: &[Point]) -> Result<Vec<Point>, SourceError> {
        let body = retry_linear(&self.config.retry, |_| {
            send_json(self.batch_request(points))
        })
        .await?;
        Ok(parse_geometries(&body))
    }
}

/// Reads the `geometries` array of a projection response.
///
/// Coordinates that are not numbers (`null`, `"NaN"`) become `None`.
#[must_use]
pub fn parse_geometries(body: &serde_json::Value) -> Vec<Point> {
    body.get("geometries")
        .and_then(serde_json::Value::as_array)
        .map(|geometries| {
            geometries
                .iter()
                .map(|g| Point {
                    x: g.get("x").and_then(serde_json::Value::as_f64),
                    y: g.get("y").and_then(serde_json::Value::as_f64),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Projects `points` in batches of `batch_size`, preserving input order.
///
/// An empty input returns immediately without touching the projector.
///
/// # Errors
///
/// Returns [`SourceError`] if a batch request fails, or
/// [`SourceError::Projection`] if a batch comes back with a different
/// number of points than it was sent.
pub async fn project_points(
    projector: &dyn PointProjector,
    points: &[Point],
    batch_size: usize,
) -> Result<Vec<Point>, SourceError> {
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = batch_size.max(1);
    let mut projected = Vec::with_capacity(points.len());

    for (i, batch) in points.chunks(batch_size).enumerate() {
        log::debug!("Projecting batch {} ({} points)", i + 1, batch.len());
        let result = projector.project_batch(batch).await?;
        if result.len() != batch.len() {
            return Err(SourceError::Projection {
                sent: batch.len(),
                received: result.len(),
            });
        }
        projected.extend(result);
    }

    log::info!("Projected {} points", projected.len());
    Ok(projected)
}
