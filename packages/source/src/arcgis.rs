//! Paginated fetcher for the snow-removal `FeatureServer` layer.
//!
//! Pages are requested with `resultOffset` / `resultRecordCount`. Paging
//! stops on an empty page or on a page shorter than the page size.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use snow_posts_models::Feature;

use crate::retry::{RetryPolicy, retry_linear, send_json};
use crate::{FeatureSource, SourceError};

/// Configuration for the feature query endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArcGisConfig {
    /// Layer query URL (`.../FeatureServer/0/query`).
    pub query_url: String,
    /// Attributes to request (`outFields`).
    #[serde(default = "default_out_fields")]
    pub out_fields: Vec<String>,
    /// `where` clause.
    #[serde(default = "default_where_clause")]
    pub where_clause: String,
    /// Features requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Per-request timeout. No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retry policy for page requests.
    #[serde(default = "RetryPolicy::single_attempt")]
    pub retry: RetryPolicy,
}

fn default_out_fields() -> Vec<String> {
    ["STATION_NO", "STATUT", "DATE_MAJ", "STATIONNEMENT", "OBJECTID"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_where_clause() -> String {
    "1=1".to_string()
}

const fn default_page_size() -> u64 {
    500
}

/// [`FeatureSource`] backed by an `ArcGIS` REST query endpoint.
pub struct ArcGisFeatureSource {
    client: reqwest::Client,
    config: ArcGisConfig,
}

impl ArcGisFeatureSource {
    /// Creates a source that queries `config.query_url` with `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client, config: ArcGisConfig) -> Self {
        Self { client, config }
    }

    fn page_request(&self, offset: u64, limit: u64) -> reqwest::RequestBuilder {
        let out_fields = self.config.out_fields.join(",");
        let offset = offset.to_string();
        let limit = limit.to_string();
        let mut request = self.client.get(&self.config.query_url).query(&[
            ("f", "json"),
            ("where", self.config.where_clause.as_str()),
            ("outFields", out_fields.as_str()),
            ("resultOffset", offset.as_str()),
            ("resultRecordCount", limit.as_str()),
            ("returnGeometry", "true"),
        ]);
        if let Some(secs) = self.config.timeout_secs {
            request = request.timeout(Duration::from_secs(secs));
        }
        request
    }
}

#[async_trait]
impl FeatureSource for ArcGisFeatureSource {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Feature>, SourceError> {
        let body = retry_linear(&self.config.retry, |_| {
            send_json(self.page_request(offset, limit))
        })
        .await?;
        parse_features(&body)
    }
}

/// Extracts the `features` array of a query response. A missing array is
/// an empty page.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if a feature has an unexpected shape.
pub fn parse_features(body: &serde_json::Value) -> Result<Vec<Feature>, SourceError> {
    let Some(features) = body.get("features") else {
        return Ok(Vec::new());
    };
    Ok(Vec::<Feature>::deserialize(features)?)
}

/// Fetches every feature of the layer, one page at a time.
///
/// The offset advances by the number of features actually returned.
///
/// # Errors
///
/// Returns [`SourceError`] from the first page request that fails.
pub async fn fetch_all_features(
    source: &dyn FeatureSource,
    page_size: u64,
) -> Result<Vec<Feature>, SourceError> {
    let page_size = page_size.max(1);
    let mut all_features: Vec<Feature> = Vec::new();
    let mut offset: u64 = 0;

    loop {
        log::info!("Posts: offset={offset}, limit={page_size}");
        let features = source.fetch_page(offset, page_size).await?;
        let count = features.len() as u64;
        if count == 0 {
            break;
        }
        all_features.extend(features);
        offset += count;
        if count < page_size {
            break;
        }
    }

    log::info!("Posts: download complete — {} features", all_features.len());
    Ok(all_features)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Serves canned pages and records the requested offsets.
    struct PagedSource {
        pages: Vec<usize>,
        requests: Mutex<Vec<(u64, u64)>>,
    }

    impl PagedSource {
        fn new(pages: &[usize]) -> Self {
            Self {
                pages: pages.to_vec(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(u64, u64)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeatureSource for PagedSource {
        async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Feature>, SourceError> {
            let mut requests = self.requests.lock().unwrap();
            let index = requests.len();
            requests.push((offset, limit));
            let len = self.pages.get(index).copied().unwrap_or(0);
            Ok((0..len)
                .map(|i| {
                    serde_json::from_value(serde_json::json!({
                        "attributes": { "OBJECTID": offset + i as u64 }
                    }))
                    .unwrap()
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let source = PagedSource::new(&[3, 3, 2, 3]);
        let features = fetch_all_features(&source, 3).await.unwrap();

        assert_eq!(features.len(), 8);
        assert_eq!(source.requests(), vec![(0, 3), (3, 3), (6, 3)]);
        assert_eq!(features[7].object_id(), "7");
    }

    #[tokio::test]
    async fn stops_on_empty_page() {
        let source = PagedSource::new(&[2, 2, 0, 2]);
        let features = fetch_all_features(&source, 2).await.unwrap();

        assert_eq!(features.len(), 4);
        assert_eq!(source.requests(), vec![(0, 2), (2, 2), (4, 2)]);
    }

    #[tokio::test]
    async fn empty_layer() {
        let source = PagedSource::new(&[]);
        let features = fetch_all_features(&source, 500).await.unwrap();

        assert!(features.is_empty());
        assert_eq!(source.requests(), vec![(0, 500)]);
    }

    #[test]
    fn parses_query_response() {
        let body = serde_json::json!({
            "objectIdFieldName": "OBJECTID",
            "features": [
                {
                    "attributes": { "OBJECTID": 1, "STATION_NO": "S1" },
                    "geometry": { "x": 299_000.0, "y": 5_041_000.0 }
                },
                { "attributes": { "OBJECTID": 2 } }
            ]
        });
        let features = parse_features(&body).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].object_id(), "1");
        assert!(features[1].geometry.is_none());
    }

    #[test]
    fn missing_features_is_empty_page() {
        assert!(parse_features(&serde_json::json!({})).unwrap().is_empty());
    }

    #[test]
    fn page_request_parameters() {
        let config: ArcGisConfig =
            serde_json::from_value(serde_json::json!({ "query_url": "http://localhost/query" }))
                .unwrap();
        let source = ArcGisFeatureSource::new(reqwest::Client::new(), config);
        let request = source.page_request(500, 500).build().unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert!(request.timeout().is_none());
        let params: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            params,
            [
                ("f", "json"),
                ("where", "1=1"),
                ("outFields", "STATION_NO,STATUT,DATE_MAJ,STATIONNEMENT,OBJECTID"),
                ("resultOffset", "500"),
                ("resultRecordCount", "500"),
                ("returnGeometry", "true"),
            ]
            .map(|(k, v)| (k.to_string(), v.to_string()))
        );
    }

    #[test]
    fn config_defaults() {
        let config: ArcGisConfig =
            serde_json::from_value(serde_json::json!({ "query_url": "http://localhost/query" }))
                .unwrap();
        assert_eq!(config.page_size, 500);
        assert_eq!(config.where_clause, "1=1");
        assert_eq!(config.out_fields.len(), 5);
        assert_eq!(config.retry, RetryPolicy::single_attempt());
    }
}
