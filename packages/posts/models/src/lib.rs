#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parking-post data types shared by the sync and repair pipelines.
//!
//! A [`Feature`] is one record as returned by the municipal `ArcGIS`
//! feature service. An [`OutputRow`] is one line of the published CSV,
//! keyed by `OBJECTID`. A [`ResolvedRow`] is the subset of an output row
//! that is expensive to recompute (projected coordinates and street label)
//! and is carried over between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Placeholder written into `RUE_REVERSE` for rows whose street label
/// still has to be looked up.
pub const MISSING_RUE: &str = "MISSING_RUE";

/// Fixed, positional header of the published CSV.
pub const OUTPUT_HEADER: [&str; 10] = [
    "STATION_NO",
    "STATUT",
    "DATE_MAJ_ISO",
    "STATIONNEMENT",
    "OBJECTID",
    "X_32187",
    "Y_32187",
    "LON_WGS84",
    "LAT_WGS84",
    "RUE_REVERSE",
];

/// Column holding the reverse-geocoded street label.
pub const LABEL_COLUMN: &str = "RUE_REVERSE";
/// Column holding the WGS84 longitude.
pub const LON_COLUMN: &str = "LON_WGS84";
/// Column holding the WGS84 latitude.
pub const LAT_COLUMN: &str = "LAT_WGS84";

/// A point geometry as sent and received by the `ArcGIS` REST API.
///
/// Both coordinates are optional: the service may return a feature with no
/// geometry, and the projection endpoint answers `null`/`NaN` for points it
/// cannot transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Easting (source SR) or longitude (WGS84).
    #[serde(default)]
    pub x: Option<f64>,
    /// Northing (source SR) or latitude (WGS84).
    #[serde(default)]
    pub y: Option<f64>,
}

impl Point {
    /// Creates a point with both coordinates present.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    /// Returns `(x, y)` if both coordinates are present and finite.
    #[must_use]
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
            _ => None,
        }
    }
}

/// Attributes requested from the feature service (`outFields`).
///
/// Values are kept as raw JSON scalars so that whatever the service sends
/// is rendered verbatim into the CSV.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PostAttributes {
    /// Station number.
    #[serde(default)]
    pub station_no: serde_json::Value,
    /// Operational status.
    #[serde(default)]
    pub statut: serde_json::Value,
    /// Last update, epoch milliseconds.
    #[serde(default)]
    pub date_maj: serde_json::Value,
    /// Parking rule text.
    #[serde(default)]
    pub stationnement: serde_json::Value,
    /// Stable unique identifier of the post.
    #[serde(default)]
    pub objectid: serde_json::Value,
}

/// One parking post as returned by the feature service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Feature {
    /// Requested attributes.
    #[serde(default)]
    pub attributes: PostAttributes,
    /// Raw geometry in the source spatial reference.
    #[serde(default)]
    pub geometry: Option<Point>,
}

impl Feature {
    /// Returns the `OBJECTID` as the string used to key output rows.
    #[must_use]
    pub fn object_id(&self) -> String {
        json_cell(&self.attributes.objectid)
    }

    /// Returns the raw geometry, or an empty point if the feature has none.
    #[must_use]
    pub fn raw_point(&self) -> Point {
        self.geometry.unwrap_or_default()
    }
}

/// Street label and WGS84 coordinates already computed for a post.
///
/// Values are the CSV cell strings as previously written, so reusing them
/// reproduces the previous output exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRow {
    /// `LON_WGS84` cell.
    pub lon: String,
    /// `LAT_WGS84` cell.
    pub lat: String,
    /// `RUE_REVERSE` cell.
    pub label: String,
}

/// One row of the published CSV. Field order is the header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OutputRow {
    #[serde(default)]
    pub station_no: String,
    #[serde(default)]
    pub statut: String,
    #[serde(default)]
    pub date_maj_iso: String,
    #[serde(default)]
    pub stationnement: String,
    #[serde(default)]
    pub objectid: String,
    #[serde(default, rename = "X_32187")]
    pub x_32187: String,
    #[serde(default, rename = "Y_32187")]
    pub y_32187: String,
    #[serde(default, rename = "LON_WGS84")]
    pub lon_wgs84: String,
    #[serde(default, rename = "LAT_WGS84")]
    pub lat_wgs84: String,
    #[serde(default)]
    pub rue_reverse: String,
}

impl OutputRow {
    /// Builds an output row from a feature and its resolved location.
    #[must_use]
    pub fn from_feature(feature: &Feature, resolved: ResolvedRow) -> Self {
        let attrs = &feature.attributes;
        let raw = feature.raw_point();
        Self {
            station_no: json_cell(&attrs.station_no),
            statut: json_cell(&attrs.statut),
            date_maj_iso: epoch_ms_to_iso(attrs.date_maj.as_f64()),
            stationnement: json_cell(&attrs.stationnement),
            objectid: feature.object_id(),
            x_32187: float_cell(raw.x),
            y_32187: float_cell(raw.y),
            lon_wgs84: resolved.lon,
            lat_wgs84: resolved.lat,
            rue_reverse: resolved.label,
        }
    }

    /// Returns the part of this row that later runs may reuse.
    #[must_use]
    pub fn resolved(&self) -> ResolvedRow {
        ResolvedRow {
            lon: self.lon_wgs84.clone(),
            lat: self.lat_wgs84.clone(),
            label: self.rue_reverse.clone(),
        }
    }
}

/// Why a row was left alone by the repair pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// The row already has a real street label.
    LabelPresent,
    /// Longitude or latitude is missing or not a number.
    InvalidCoordinates,
}

/// Per-row state of the repair pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RepairState {
    /// Empty or sentinel label with usable coordinates.
    NeedsLookup {
        /// WGS84 longitude.
        lon: f64,
        /// WGS84 latitude.
        lat: f64,
    },
    /// Lookup produced a label.
    Resolved,
    /// Lookup failed or came back empty; the label is cleared.
    Unresolved,
    /// No lookup was attempted.
    Skipped(SkipReason),
}

/// Returns `true` if `label` marks a row whose street still has to be
/// resolved (empty, or the [`MISSING_RUE`] sentinel in any case).
#[must_use]
pub fn label_is_missing(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label.eq_ignore_ascii_case(MISSING_RUE)
}

/// Parses a coordinate cell. Empty cells and the literal `None` count as
/// missing.
#[must_use]
pub fn parse_coordinate(cell: Option<&str>) -> Option<f64> {
    let cell = cell?.trim();
    if cell.is_empty() || cell == "None" {
        return None;
    }
    cell.parse().ok()
}

/// Decides what the repair pipeline does with a row, given its label and
/// coordinate cells.
#[must_use]
pub fn classify_row(label: &str, lon: Option<&str>, lat: Option<&str>) -> RepairState {
    if !label_is_missing(label) {
        return RepairState::Skipped(SkipReason::LabelPresent);
    }
    match (parse_coordinate(lon), parse_coordinate(lat)) {
        (Some(lon), Some(lat)) => RepairState::NeedsLookup { lon, lat },
        _ => RepairState::Skipped(SkipReason::InvalidCoordinates),
    }
}

/// Renders a JSON scalar as a CSV cell: strings verbatim, numbers and
/// booleans in their JSON text form, `null` as empty.
#[must_use]
pub fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders an optional coordinate as a CSV cell, in the same number form
/// [`json_cell`] uses for numeric attributes (`296000.0`, `-73.5`). Missing
/// and non-finite values are empty.
#[must_use]
pub fn float_cell(value: Option<f64>) -> String {
    value
        .and_then(serde_json::Number::from_f64)
        .map(|n| n.to_string())
        .unwrap_or_default()
}

/// Converts epoch milliseconds to a naive UTC ISO-8601 timestamp.
///
/// Whole seconds render as `YYYY-MM-DDTHH:MM:SS`; a non-zero fraction adds
/// a six-digit microsecond suffix. `None` and out-of-range values render as
/// an empty string.
#[must_use]
pub fn epoch_ms_to_iso(ms: Option<f64>) -> String {
    let Some(ms) = ms.filter(|ms| ms.is_finite()) else {
        return String::new();
    };
    #[allow(clippy::cast_possible_truncation)]
    let micros = (ms * 1000.0).round() as i64;
    let Some(dt) = DateTime::<Utc>::from_timestamp_micros(micros) else {
        return String::new();
    };
    if micros.rem_euclid(1_000_000) == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}
