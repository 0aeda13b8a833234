//! Retry helpers for the `ArcGIS` services.
//!
//! [`retry_linear`] is the one retry loop in the workspace: it calls an
//! `attempt(n)` closure up to [`RetryPolicy::max_attempts`] times, sleeping
//! `n * backoff_step` between attempts. [`send_json`] performs a single
//! request and turns every failure mode (transport, HTTP status, garbled
//! body, `ArcGIS` error envelope) into a [`SourceError`], so callers can
//! wrap it in [`retry_linear`]. [`fetch_json`] does the same but hands an
//! error envelope back as a normal body.
//!
//! ```ignore
//! let body = retry::retry_linear(&policy, |_| {
//!     retry::send_json(client.get(&url).query(&params))
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::SourceError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Bounded retry with linearly increasing backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated
    /// as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff unit in milliseconds; the wait after attempt `n` is
    /// `n * backoff_step_ms`.
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_step_ms() -> u64 {
    500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            backoff_step_ms: 0,
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Runs `attempt(n)` for `n = 1..=max_attempts` until it succeeds, waiting
/// [`RetryPolicy::backoff`] between failures. Returns the last error once
/// every attempt has failed.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_linear<T, E, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) if n < max_attempts => {
                let delay = policy.backoff(n);
                log::warn!("  attempt {n}/{max_attempts} failed: {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sends a request and parses the response body as JSON.
///
/// Non-2xx statuses are errors. A 2xx body carrying an `ArcGIS` error
/// envelope (`{"error": {"code": .., "message": ..}}`) is reported as
/// [`SourceError::Service`].
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails, the status is not
/// successful, the body is not JSON, or the body is an error envelope.
pub async fn send_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, SourceError> {
    let body = fetch_json(request).await?;
    check_error_envelope(&body)?;
    Ok(body)
}

/// Like [`send_json`], but leaves an error envelope in the returned body
/// for the caller to interpret.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails, the status is not
/// successful, or the body is not JSON.
pub async fn fetch_json(request: reqwest::RequestBuilder) -> Result<serde_json::Value, SourceError> {
    let response = request.send().await?.error_for_status()?;
    let url = response.url().to_string();
    let status = response.status();
    let text = response.text().await?;
    parse_body(&url, status, &text)
}

fn parse_body(
    url: &str,
    status: reqwest::StatusCode,
    text: &str,
) -> Result<serde_json::Value, SourceError> {
    serde_json::from_str(text).map_err(|e| {
        log::debug!(
            "JSON parse failed\n  \
             url: {url}\n  \
             status: {status}\n  \
             received: {} bytes\n  \
             body preview: {}",
            text.len(),
            preview(text),
        );
        SourceError::Json(e)
    })
}

/// Fails with [`SourceError::Service`] if `body` is an `ArcGIS` error
/// envelope.
///
/// # Errors
///
/// Returns [`SourceError::Service`] when `body.error` is present.
pub fn check_error_envelope(body: &serde_json::Value) -> Result<(), SourceError> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    Err(SourceError::Service {
        code: error
            .get("code")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_default(),
        message: error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    })
}

fn preview(text: &str) -> &str {
    if text.len() <= BODY_PREVIEW_LEN {
        return text;
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
