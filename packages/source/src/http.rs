//! Shared `reqwest` client construction.

use serde::Deserialize;

use crate::SourceError;

/// HTTP client settings shared by every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Skip TLS certificate verification. Only meant for a legacy endpoint
    /// with a broken certificate chain.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional `User-Agent` header.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Builds the [`reqwest::Client`] used for all requests of a run.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the client cannot be constructed.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, SourceError> {
    let mut builder = reqwest::Client::builder();
    if config.accept_invalid_certs {
        log::warn!("TLS certificate verification is disabled (http.accept_invalid_certs = true)");
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }
    Ok(builder.build()?)
}
