//! `ArcGIS` World `GeocodeServer` `reverseGeocode` client.
//!
//! See <https://developers.arcgis.com/rest/geocode/api-reference/geocoding-reverse-geocode.htm>

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use snow_posts_source::retry::{RetryPolicy, fetch_json};

use crate::{GeocodeError, ReverseGeocoder};

/// Address fields tried in order when picking a label.
const LABEL_FIELDS: [&str; 3] = ["LongLabel", "Address", "Match_addr"];

/// Configuration for the reverse-geocode endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReverseGeocodeConfig {
    /// `reverseGeocode` URL.
    pub url: String,
    /// Language of the returned labels.
    #[serde(default = "default_lang_code")]
    pub lang_code: String,
    /// Spatial reference of the `location` parameter.
    #[serde(default = "default_out_sr")]
    pub out_sr: u32,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy applied by the label resolver.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_lang_code() -> String {
    "fr".to_string()
}

const fn default_out_sr() -> u32 {
    4326
}

const fn default_timeout_secs() -> u64 {
    10
}

/// [`ReverseGeocoder`] backed by the `ArcGIS` `reverseGeocode` operation.
pub struct ArcGisReverseGeocoder {
    client: reqwest::Client,
    config: ReverseGeocodeConfig,
}

impl ArcGisReverseGeocoder {
    /// Creates a geocoder that queries `config.url` with `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client, config: ReverseGeocodeConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, lon: f64, lat: f64) -> reqwest::RequestBuilder {
        let location = format!("{lon},{lat}");
        let out_sr = self.config.out_sr.to_string();
        self.client
            .get(&self.config.url)
            .query(&[
                ("f", "json"),
                ("location", location.as_str()),
                ("langCode", self.config.lang_code.as_str()),
                ("outSR", out_sr.as_str()),
            ])
            .timeout(Duration::from_secs(self.config.timeout_secs))
    }
}

#[async_trait]
impl ReverseGeocoder for ArcGisReverseGeocoder {
    async fn reverse(&self, lon: f64, lat: f64) -> Result<String, GeocodeError> {
        let body = fetch_json(self.request(lon, lat)).await?;

        if !body.is_object() {
            return Err(GeocodeError::Parse {
                message: format!("reverseGeocode response is not an object: {body}"),
            });
        }
        if let Some(error) = body.get("error") {
            // "Unable to find address for the specified location" comes back
            // as an error envelope; there is nothing to retry.
            log::debug!("No address at {lon},{lat}: {error}");
        }
        Ok(select_label(&body))
    }
}

/// Picks the street label from a `reverseGeocode` response, preferring
/// `LongLabel`, then `Address`, then `Match_addr`. Missing or empty fields
/// are skipped; the result is empty if none is usable.
#[must_use]
pub fn select_label(body: &serde_json::Value) -> String {
    let Some(address) = body.get("address") else {
        return String::new();
    };
    LABEL_FIELDS
        .iter()
        .filter_map(|field| address.get(*field).and_then(serde_json::Value::as_str))
        .find(|label| !label.is_empty())
        .unwrap_or_default()
        .to_string()
}
