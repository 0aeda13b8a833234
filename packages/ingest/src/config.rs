//! Run configuration.
//!
//! The defaults are embedded from `config/default.toml`. A user file is
//! merged over them table by table, so it only has to name the keys it
//! changes.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use snow_posts_geocoder::arcgis_reverse::ReverseGeocodeConfig;
use snow_posts_source::arcgis::ArcGisConfig;
use snow_posts_source::http::HttpConfig;
use snow_posts_source::projection::ProjectionConfig;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "SNOW_POSTS_CONFIG";

/// Errors from loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Settings of the sync pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Pause after each reverse-geocode request, in milliseconds.
    #[serde(default)]
    pub request_delay_ms: u64,
}

/// Settings of the repair pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RepairConfig {
    /// Pause after each reverse-geocode request, in milliseconds.
    #[serde(default = "default_repair_delay_ms")]
    pub request_delay_ms: u64,
}

const fn default_repair_delay_ms() -> u64 {
    80
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_repair_delay_ms(),
        }
    }
}

/// Everything a run needs: endpoints, paging and batching, retry and
/// pacing, and the CSV location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// Published CSV (sync output, repair input and output).
    pub output_csv: PathBuf,
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,
    /// Feature query endpoint.
    pub source: ArcGisConfig,
    /// Geometry projection endpoint.
    pub projection: ProjectionConfig,
    /// Reverse-geocode endpoint.
    pub geocoder: ReverseGeocodeConfig,
    /// Sync pipeline settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Repair pipeline settings.
    #[serde(default)]
    pub repair: RepairConfig,
}

impl IngestConfig {
    /// The embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the embedded file is malformed.
    pub fn embedded() -> Result<Self, ConfigError> {
        Ok(toml::from_str(DEFAULT_CONFIG)?)
    }

    /// Merges `overlay` (TOML text) over the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if either document is malformed or the
    /// merged result has the wrong shape.
    pub fn from_overlay(overlay: &str) -> Result<Self, ConfigError> {
        let mut base: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        let overlay: toml::Table = toml::from_str(overlay)?;
        merge_tables(&mut base, overlay);
        Ok(toml::Value::Table(base).try_into()?)
    }

    /// Loads the configuration from `path` when given, otherwise from the
    /// file named by [`CONFIG_ENV_VAR`], otherwise the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let Some(path) = path else {
            return Self::embedded();
        };

        log::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_overlay(&text)
    }
}

/// Recursively merges `overlay` into `base`. Tables merge key by key; any
/// other value replaces the base value.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(overlay_table) => {
                if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                    merge_tables(base_table, overlay_table);
                } else {
                    base.insert(key, toml::Value::Table(overlay_table));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use snow_posts_source::retry::RetryPolicy;

    use super::*;

    #[test]
    fn embedded_defaults() {
        let config = IngestConfig::embedded().unwrap();

        assert_eq!(config.output_csv, PathBuf::from("posts.csv"));
        assert!(!config.http.accept_invalid_certs);
        assert_eq!(config.source.page_size, 500);
        assert_eq!(config.source.retry, RetryPolicy::single_attempt());
        assert_eq!(config.projection.batch_size, 200);
        assert_eq!(config.projection.in_sr, 32187);
        assert_eq!(config.geocoder.lang_code, "fr");
        assert_eq!(config.geocoder.timeout_secs, 10);
        assert_eq!(
            config.geocoder.retry,
            RetryPolicy {
                max_attempts: 3,
                backoff_step_ms: 500
            }
        );
        assert_eq!(config.sync.request_delay_ms, 0);
        assert_eq!(config.repair.request_delay_ms, 80);
    }

    #[test]
    fn overlay_replaces_only_named_keys() {
        let config = IngestConfig::from_overlay(
            r#"
            output_csv = "/tmp/out.csv"

            [geocoder]
            url = "http://localhost:8080/reverse"

            [geocoder.retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.output_csv, PathBuf::from("/tmp/out.csv"));
        assert_eq!(config.geocoder.url, "http://localhost:8080/reverse");
        assert_eq!(config.geocoder.retry.max_attempts, 5);
        assert_eq!(config.geocoder.retry.backoff_step_ms, 500);
        assert_eq!(config.geocoder.lang_code, "fr");
        assert_eq!(config.source.page_size, 500);
    }

    #[test]
    fn malformed_overlay_is_an_error() {
        assert!(matches!(
            IngestConfig::from_overlay("[source]\npage_size = \"many\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = IngestConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn loads_file_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snow_posts.toml");
        std::fs::write(&path, "[http]\naccept_invalid_certs = true\n").unwrap();

        let config = IngestConfig::load(Some(&path)).unwrap();
        assert!(config.http.accept_invalid_certs);
    }
}
