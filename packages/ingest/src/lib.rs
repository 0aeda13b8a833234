#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sync and repair pipelines for the snow-removal parking-post CSV.
//!
//! - [`sync_posts`]: fetch every post, project new posts to WGS84,
//!   reverse-geocode them, reuse rows already resolved by a previous run,
//!   and publish the CSV.
//! - [`fill_missing`]: re-geocode rows of an existing CSV whose street
//!   label is empty or `MISSING_RUE`, rewriting the file in place.
//!
//! Both take their endpoints and pacing from [`config::IngestConfig`]; the
//! network-facing pieces are passed in as trait objects so tests can
//! substitute them.

pub mod config;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use snow_posts_database::DbError;
use snow_posts_database::output::write_output;
use snow_posts_database::row_store::{CsvRowStore, RowStore};
use snow_posts_database::table::CsvTable;
use snow_posts_geocoder::ReverseGeocoder;
use snow_posts_geocoder::arcgis_reverse::ArcGisReverseGeocoder;
use snow_posts_geocoder::resolver::LabelResolver;
use snow_posts_models::{
    Feature, LABEL_COLUMN, LAT_COLUMN, LON_COLUMN, OutputRow, RepairState, ResolvedRow,
    SkipReason, classify_row, float_cell,
};
use snow_posts_source::arcgis::{ArcGisFeatureSource, fetch_all_features};
use snow_posts_source::http::build_client;
use snow_posts_source::progress::ProgressCallback;
use snow_posts_source::projection::{ArcGisProjector, project_points};
use snow_posts_source::{FeatureSource, PointProjector, SourceError};

use crate::config::{ConfigError, IngestConfig};

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Fetching or projecting posts failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Reading or writing the CSV failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Counts reported by [`sync_posts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Posts written.
    pub total: usize,
    /// Posts copied from the previous output.
    pub reused: usize,
    /// New posts that got a street label.
    pub labelled: usize,
    /// New posts left without a street label.
    pub unlabelled: usize,
}

/// Counts reported by [`fill_missing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Rows whose label was filled in.
    pub updated: usize,
    /// Rows that already had a label.
    pub skipped: usize,
    /// Rows with a missing label and unusable coordinates.
    pub invalid_coordinates: usize,
    /// Rows looked up without success; their label is now empty.
    pub unresolved: usize,
}

/// Builds a resolver that queries the configured `ArcGIS` geocoder and
/// pauses `delay_ms` after each request.
#[must_use]
pub fn arcgis_resolver(
    client: reqwest::Client,
    config: &IngestConfig,
    delay_ms: u64,
) -> LabelResolver<ArcGisReverseGeocoder> {
    LabelResolver::new(
        ArcGisReverseGeocoder::new(client, config.geocoder.clone()),
        config.geocoder.retry,
        Duration::from_millis(delay_ms),
    )
}

/// Runs the sync pipeline against the configured `ArcGIS` services,
/// reusing rows from the existing `output_csv`.
///
/// # Errors
///
/// Returns [`IngestError`] if fetching, projecting, or writing fails.
pub async fn run_sync(
    config: &IngestConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SyncSummary, IngestError> {
    let client = build_client(&config.http)?;
    let source = ArcGisFeatureSource::new(client.clone(), config.source.clone());
    let projector = ArcGisProjector::new(client.clone(), config.projection.clone());
    let mut resolver = arcgis_resolver(client, config, config.sync.request_delay_ms);
    let store = CsvRowStore::open(&config.output_csv)?;

    sync_posts(config, &source, &projector, &mut resolver, &store, progress).await
}

/// Runs the repair pipeline on `path` against the configured `ArcGIS`
/// geocoder.
///
/// # Errors
///
/// Returns [`IngestError`] if the CSV cannot be read or written.
pub async fn run_fill_missing(
    config: &IngestConfig,
    path: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RepairSummary, IngestError> {
    let client = build_client(&config.http)?;
    let mut resolver = arcgis_resolver(client, config, config.repair.request_delay_ms);

    fill_missing(path, &mut resolver, progress).await
}

/// Fetches every post, resolves coordinates and street labels for posts
/// not found in `store`, and writes all posts to `config.output_csv`.
///
/// Posts present in `store` keep their stored longitude, latitude, and
/// label verbatim and are neither projected nor geocoded. The file is only
/// written once every post has been processed.
///
/// # Errors
///
/// Returns [`IngestError`] if a page fetch or projection batch fails, or
/// if the output cannot be written. Geocoding failures never abort the
/// run; they leave the label empty.
pub async fn sync_posts<G: ReverseGeocoder>(
    config: &IngestConfig,
    source: &dyn FeatureSource,
    projector: &dyn PointProjector,
    resolver: &mut LabelResolver<G>,
    store: &dyn RowStore,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SyncSummary, IngestError> {
    let start = Instant::now();
    let features = fetch_all_features(source, config.source.page_size).await?;

    let new_points: Vec<_> = features
        .iter()
        .filter(|f| store.get(&f.object_id()).is_none())
        .map(Feature::raw_point)
        .collect();
    log::info!(
        "{} posts fetched, {} new since the previous run",
        features.len(),
        new_points.len()
    );
    let projected = project_points(projector, &new_points, config.projection.batch_size).await?;
    let mut projected = projected.into_iter();

    progress.set_total(features.len() as u64);
    progress.set_message("Resolving street labels".to_string());

    let mut summary = SyncSummary::default();
    let mut rows = Vec::with_capacity(features.len());

    for feature in &features {
        let resolved = if let Some(existing) = store.get(&feature.object_id()) {
            summary.reused += 1;
            existing.clone()
        } else {
            let point = projected.next().unwrap_or_default();
            let label = resolver.resolve(point.x, point.y).await;
            if label.is_empty() {
                summary.unlabelled += 1;
            } else {
                summary.labelled += 1;
            }
            ResolvedRow {
                lon: float_cell(point.x),
                lat: float_cell(point.y),
                label,
            }
        };
        rows.push(OutputRow::from_feature(feature, resolved));
        progress.inc(1);
    }

    write_output(&config.output_csv, &rows)?;
    summary.total = rows.len();

    let stats = resolver.stats();
    progress.finish(format!("{} posts written", summary.total));
    log::info!(
        "Wrote {} posts to {} in {:.1}s ({} reused, {} labelled, {} without label; \
         {} geocode requests, {} cache hits)",
        summary.total,
        config.output_csv.display(),
        start.elapsed().as_secs_f64(),
        summary.reused,
        summary.labelled,
        summary.unlabelled,
        stats.requests,
        stats.cache_hits,
    );
    Ok(summary)
}

/// Fills in missing street labels of the CSV at `path`, in place.
///
/// A row is looked up when its `RUE_REVERSE` is empty or `MISSING_RUE`
/// (any case) and both `LON_WGS84` and `LAT_WGS84` parse as numbers. A
/// successful lookup stores the label; a failed or empty one clears the
/// cell. All other rows, and the header order, are written back unchanged.
///
/// # Errors
///
/// Returns [`IngestError`] if the CSV cannot be read or written, or has no
/// `RUE_REVERSE` column.
pub async fn fill_missing<G: ReverseGeocoder>(
    path: &Path,
    resolver: &mut LabelResolver<G>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RepairSummary, IngestError> {
    let mut table = CsvTable::read(path)?;
    let label_col = table.require_column(LABEL_COLUMN, path)?;
    let lon_col = table.column(LON_COLUMN);
    let lat_col = table.column(LAT_COLUMN);

    progress.set_total(table.len() as u64);
    progress.set_message("Filling missing street labels".to_string());

    let mut summary = RepairSummary::default();

    for row in 0..table.len() {
        let label = table.cell(row, label_col).unwrap_or_default();
        let lon = lon_col.and_then(|c| table.cell(row, c));
        let lat = lat_col.and_then(|c| table.cell(row, c));

        let state = match classify_row(label, lon, lat) {
            RepairState::NeedsLookup { lon, lat } => {
                let label = resolver.resolve(Some(lon), Some(lat)).await;
                let state = if label.is_empty() {
                    RepairState::Unresolved
                } else {
                    RepairState::Resolved
                };
                table.set_cell(row, label_col, label);
                state
            }
            state => state,
        };

        match state {
            RepairState::Resolved => summary.updated += 1,
            RepairState::Unresolved => summary.unresolved += 1,
            RepairState::Skipped(SkipReason::LabelPresent) => summary.skipped += 1,
            RepairState::Skipped(SkipReason::InvalidCoordinates) => {
                summary.invalid_coordinates += 1;
            }
            RepairState::NeedsLookup { .. } => {}
        }
        log::trace!("Row {row}: {state}");
        progress.inc(1);
    }

    table.write(path)?;

    progress.finish(format!("{} labels filled", summary.updated));
    log::info!(
        "Updated {} rows; skipped existing {}; {} unresolved; {} without valid coordinates.",
        summary.updated,
        summary.skipped,
        summary.unresolved,
        summary.invalid_coordinates,
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use snow_posts_database::row_store::MemoryRowStore;
    use snow_posts_geocoder::GeocodeError;
    use snow_posts_models::Point;
    use snow_posts_source::progress::null_progress;
    use snow_posts_source::retry::RetryPolicy;

    use super::*;

    const NO_WAIT: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        backoff_step_ms: 0,
    };

    /// Serves `features` in pages of the requested size.
    struct VecSource {
        features: Vec<Feature>,
    }

    #[async_trait]
    impl FeatureSource for VecSource {
        async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Feature>, SourceError> {
            let start = usize::try_from(offset).unwrap().min(self.features.len());
            let end = (start + usize::try_from(limit).unwrap()).min(self.features.len());
            Ok(self.features[start..end].to_vec())
        }
    }

    /// Maps `(x, y)` to `(-70 - x, 45 + y)` and counts projected points.
    #[derive(Default)]
    struct OffsetProjector {
        projected: Mutex<usize>,
    }

    #[async_trait]
    impl PointProjector for OffsetProjector {
        async fn project_batch(&self, points: &[Point]) -> Result<Vec<Point>, SourceError> {
            *self.projected.lock().unwrap() += points.len();
            Ok(points
                .iter()
                .map(|p| Point {
                    x: p.x.map(|x| -70.0 - x),
                    y: p.y.map(|y| 45.0 + y),
                })
                .collect())
        }
    }

    /// Answers `label` for every point, or fails when `label` is `None`.
    struct FixedGeocoder {
        label: Option<&'static str>,
        calls: Mutex<Vec<(f64, f64)>>,
    }

    impl FixedGeocoder {
        fn new(label: Option<&'static str>) -> Self {
            Self {
                label,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(f64, f64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReverseGeocoder for FixedGeocoder {
        async fn reverse(&self, lon: f64, lat: f64) -> Result<String, GeocodeError> {
            self.calls.lock().unwrap().push((lon, lat));
            self.label
                .map(String::from)
                .ok_or_else(|| GeocodeError::Parse {
                    message: "service unavailable".to_string(),
                })
        }
    }

    fn resolver(label: Option<&'static str>) -> LabelResolver<FixedGeocoder> {
        LabelResolver::new(FixedGeocoder::new(label), NO_WAIT, Duration::ZERO)
    }

    fn feature(objectid: u64, x: Option<f64>, y: Option<f64>) -> Feature {
        let mut value = serde_json::json!({
            "attributes": {
                "STATION_NO": format!("S{objectid}"),
                "STATUT": "A",
                "DATE_MAJ": 0,
                "STATIONNEMENT": "X",
                "OBJECTID": objectid
            }
        });
        if x.is_some() || y.is_some() {
            value["geometry"] = serde_json::json!({ "x": x, "y": y });
        }
        serde_json::from_value(value).unwrap()
    }

    fn test_config(dir: &Path) -> IngestConfig {
        let mut config = IngestConfig::embedded().unwrap();
        config.output_csv = dir.join("posts.csv");
        config.source.page_size = 2;
        config.projection.batch_size = 2;
        config
    }

    fn data_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(String::from)
            .collect()
    }

    #[tokio::test]
    async fn sync_reuses_existing_row_without_geocoding() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let source = VecSource {
            features: vec![feature(42, Some(1.0), Some(2.0))],
        };
        let projector = OffsetProjector::default();
        let mut resolver = resolver(Some("Rue Autre"));
        let mut store = MemoryRowStore::new();
        store.insert(
            "42".to_string(),
            ResolvedRow {
                lon: "-73.5".to_string(),
                lat: "45.5".to_string(),
                label: "Rue Test".to_string(),
            },
        );

        let summary = sync_posts(
            &config,
            &source,
            &projector,
            &mut resolver,
            &store,
            &null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                total: 1,
                reused: 1,
                labelled: 0,
                unlabelled: 0
            }
        );
        assert!(resolver.geocoder().calls().is_empty());
        assert_eq!(*projector.projected.lock().unwrap(), 0);
        assert_eq!(
            data_lines(&config.output_csv),
            ["S42,A,1970-01-01T00:00:00,X,42,1.0,2.0,-73.5,45.5,Rue Test"]
        );
    }

    #[tokio::test]
    async fn sync_resolves_new_posts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let source = VecSource {
            features: vec![
                feature(1, Some(3.5), Some(0.5)),
                feature(2, Some(9.0), Some(9.0)),
                feature(3, Some(3.5), Some(0.5)),
                feature(4, None, None),
                feature(5, Some(1.0), Some(1.0)),
            ],
        };
        let projector = OffsetProjector::default();
        let mut resolver = resolver(Some("Rue Sainte-Catherine"));
        let mut store = MemoryRowStore::new();
        store.insert(
            "2".to_string(),
            ResolvedRow {
                lon: "-79".to_string(),
                lat: "54".to_string(),
                label: String::new(),
            },
        );

        let summary = sync_posts(
            &config,
            &source,
            &projector,
            &mut resolver,
            &store,
            &null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                total: 5,
                reused: 1,
                labelled: 3,
                unlabelled: 1
            }
        );
        // Posts 1 and 3 share a point; post 4 has no geometry.
        assert_eq!(
            resolver.geocoder().calls(),
            vec![(-73.5, 45.5), (-71.0, 46.0)]
        );
        assert_eq!(*projector.projected.lock().unwrap(), 4);
        assert_eq!(
            data_lines(&config.output_csv),
            [
                "S1,A,1970-01-01T00:00:00,X,1,3.5,0.5,-73.5,45.5,Rue Sainte-Catherine",
                "S2,A,1970-01-01T00:00:00,X,2,9.0,9.0,-79,54,",
                "S3,A,1970-01-01T00:00:00,X,3,3.5,0.5,-73.5,45.5,Rue Sainte-Catherine",
                "S4,A,1970-01-01T00:00:00,X,4,,,,,",
                "S5,A,1970-01-01T00:00:00,X,5,1.0,1.0,-71.0,46.0,Rue Sainte-Catherine",
            ]
        );
    }

    #[tokio::test]
    async fn sync_keeps_running_when_geocoding_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let source = VecSource {
            features: vec![feature(7, Some(1.0), Some(1.0))],
        };
        let mut resolver = resolver(None);

        let summary = sync_posts(
            &config,
            &source,
            &OffsetProjector::default(),
            &mut resolver,
            &MemoryRowStore::new(),
            &null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(summary.unlabelled, 1);
        assert_eq!(resolver.geocoder().calls().len(), 3);
        assert_eq!(
            data_lines(&config.output_csv),
            ["S7,A,1970-01-01T00:00:00,X,7,1.0,1.0,-71.0,46.0,"]
        );
    }

    #[tokio::test]
    async fn sync_rerun_reproduces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let source = VecSource {
            features: vec![feature(42, Some(3.5), Some(0.5))],
        };

        let mut first = resolver(Some("Rue Test"));
        sync_posts(
            &config,
            &source,
            &OffsetProjector::default(),
            &mut first,
            &CsvRowStore::open(&config.output_csv).unwrap(),
            &null_progress(),
        )
        .await
        .unwrap();
        let before = std::fs::read_to_string(&config.output_csv).unwrap();

        let mut second = resolver(Some("Rue Changée"));
        sync_posts(
            &config,
            &source,
            &OffsetProjector::default(),
            &mut second,
            &CsvRowStore::open(&config.output_csv).unwrap(),
            &null_progress(),
        )
        .await
        .unwrap();

        assert!(second.geocoder().calls().is_empty());
        assert_eq!(std::fs::read_to_string(&config.output_csv).unwrap(), before);
    }

    const REPAIR_HEADER: &str = "STATION_NO,STATUT,DATE_MAJ_ISO,STATIONNEMENT,OBJECTID,X_32187,Y_32187,LON_WGS84,LAT_WGS84,RUE_REVERSE";

    #[tokio::test]
    async fn repair_fills_only_missing_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        std::fs::write(
            &path,
            format!(
                "{REPAIR_HEADER}\n\
                 S1,A,2023-11-14T22:13:20,X,1,1,2,-73.6,45.6,Rue A\n\
                 S2,A,2023-11-14T22:13:20,X,2,1,2,-73.5,45.5,MISSING_RUE\n\
                 S3,A,2023-11-14T22:13:20,X,3,1,2,,,\n"
            ),
        )
        .unwrap();
        let mut resolver = resolver(Some("Rue B"));

        let summary = fill_missing(&path, &mut resolver, &null_progress())
            .await
            .unwrap();

        assert_eq!(
            summary,
            RepairSummary {
                updated: 1,
                skipped: 1,
                invalid_coordinates: 1,
                unresolved: 0
            }
        );
        assert_eq!(resolver.geocoder().calls(), vec![(-73.5, 45.5)]);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                REPAIR_HEADER,
                "S1,A,2023-11-14T22:13:20,X,1,1,2,-73.6,45.6,Rue A",
                "S2,A,2023-11-14T22:13:20,X,2,1,2,-73.5,45.5,Rue B",
                "S3,A,2023-11-14T22:13:20,X,3,1,2,,,",
            ]
        );
    }

    #[tokio::test]
    async fn repair_preserves_custom_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        std::fs::write(
            &path,
            "RUE_REVERSE,OBJECTID,LAT_WGS84,NOTE,LON_WGS84\r\n\
             missing_rue,1,45.5,\"a, b\",-73.5\r\n\
             Rue Existing,2,45.5,,-73.5\r\n\
             ,3,abc,,-73.5\r\n",
        )
        .unwrap();
        let mut resolver = resolver(Some("Rue C"));

        fill_missing(&path, &mut resolver, &null_progress())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "RUE_REVERSE,OBJECTID,LAT_WGS84,NOTE,LON_WGS84\r\n\
             Rue C,1,45.5,\"a, b\",-73.5\r\n\
             Rue Existing,2,45.5,,-73.5\r\n\
             ,3,abc,,-73.5\r\n"
        );
    }

    #[tokio::test]
    async fn repair_clears_sentinel_when_lookup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        std::fs::write(
            &path,
            "OBJECTID,LON_WGS84,LAT_WGS84,RUE_REVERSE\n1,-73.5,45.5,MISSING_RUE\n",
        )
        .unwrap();
        let mut resolver = resolver(None);

        let summary = fill_missing(&path, &mut resolver, &null_progress())
            .await
            .unwrap();

        assert_eq!(summary.unresolved, 1);
        assert_eq!(resolver.geocoder().calls().len(), 3);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "OBJECTID,LON_WGS84,LAT_WGS84,RUE_REVERSE\r\n1,-73.5,45.5,\r\n"
        );
    }

    #[tokio::test]
    async fn repair_requires_label_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.csv");
        std::fs::write(&path, "OBJECTID,LON_WGS84,LAT_WGS84\n1,-73.5,45.5\n").unwrap();
        let mut resolver = resolver(Some("Rue D"));

        let result = fill_missing(&path, &mut resolver, &null_progress()).await;

        assert!(matches!(
            result,
            Err(IngestError::Db(DbError::MissingColumn { .. }))
        ));
        assert!(resolver.geocoder().calls().is_empty());
    }
}
