//! Cached, retrying street-label lookups shared by both pipelines.

use std::time::Duration;

use snow_posts_source::retry::{RetryPolicy, retry_linear};

use crate::ReverseGeocoder;
use crate::cache::GeocodeCache;

/// Counters for the lookups made by a [`LabelResolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    /// Points sent to the geocoder (after the cache).
    pub requests: u64,
    /// Points answered from the cache.
    pub cache_hits: u64,
    /// Points whose every attempt failed.
    pub failures: u64,
}

/// Resolves points to street labels through a [`ReverseGeocoder`].
///
/// Each distinct point (rounded to six decimals) is looked up at most once
/// per resolver. Failed lookups are retried per the [`RetryPolicy`] and
/// then resolve to an empty label, which is cached as well.
pub struct LabelResolver<G> {
    geocoder: G,
    retry: RetryPolicy,
    delay: Duration,
    cache: GeocodeCache,
    stats: LookupStats,
}

impl<G: ReverseGeocoder> LabelResolver<G> {
    /// Creates a resolver. `delay` is slept after every request that
    /// reaches the geocoder.
    #[must_use]
    pub const fn new(geocoder: G, retry: RetryPolicy, delay: Duration) -> Self {
        Self {
            geocoder,
            retry,
            delay,
            cache: GeocodeCache::new(),
            stats: LookupStats {
                requests: 0,
                cache_hits: 0,
                failures: 0,
            },
        }
    }

    /// Returns the street label for `(lon, lat)`, or an empty string when
    /// a coordinate is missing or the lookup failed.
    pub async fn resolve(&mut self, lon: Option<f64>, lat: Option<f64>) -> String {
        let (Some(lon), Some(lat)) = (lon, lat) else {
            return String::new();
        };
        if let Some(label) = self.cache.get(lon, lat) {
            self.stats.cache_hits += 1;
            return label.to_string();
        }

        self.stats.requests += 1;
        let geocoder = &self.geocoder;
        let result = retry_linear(&self.retry, |_| geocoder.reverse(lon, lat)).await;
        let label = match result {
            Ok(label) => label,
            Err(e) => {
                log::warn!("Reverse geocode failed for {lon},{lat}: {e}");
                self.stats.failures += 1;
                String::new()
            }
        };
        self.cache.insert(lon, lat, label.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        label
    }

    /// Lookup counters so far.
    #[must_use]
    pub const fn stats(&self) -> LookupStats {
        self.stats
    }

    /// The wrapped geocoder.
    #[must_use]
    pub const fn geocoder(&self) -> &G {
        &self.geocoder
    }
}
