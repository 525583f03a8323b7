//! Shared HTTP plumbing for provider clients.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::api::models::process::LlmProvider;
use crate::errors::{Error, Result};

/// Upper bound on how much of an error body ends up in messages and logs
const MAX_ERROR_BODY: usize = 512;

/// Build an HTTP client, optionally bounding every request by `timeout`.
///
/// reqwest is built without a bundled crypto provider, so the process default is installed here
/// if nothing has installed one yet.
pub fn build_client(timeout: Option<Duration>) -> anyhow::Result<Client> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Everything a provider client needs to reach its API.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub client: Client,
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
}

impl Endpoint {
    /// Resolve `path` against the base URL, keeping the base URL's own path.
    pub fn url(&self, provider: LlmProvider, path: &str) -> Result<Url> {
        ensure_slash(&self.base_url)
            .join(path)
            .map_err(|e| Error::provider(provider, format!("invalid endpoint URL: {e}")))
    }
}

/// Makes sure a url has a trailing slash.
///
/// `Url::join` replaces the last path segment unless the base ends in '/', so
/// '/v1' + 'chat' gives '/chat' while '/v1/' + 'chat' gives '/v1/chat'.
pub fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

/// Send a request and decode a successful JSON response body.
pub async fn send_json<T: DeserializeOwned>(provider: LlmProvider, request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(|e| Error::provider(provider, e))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| Error::provider(provider, e))?;

    if !status.is_success() {
        let excerpt = truncate(&body, MAX_ERROR_BODY);
        tracing::error!(%provider, %status, body = excerpt, "Provider returned an error status");
        return Err(Error::provider(provider, format!("API error {status}: {excerpt}")));
    }

    tracing::debug!(%provider, bytes = body.len(), "Provider response received");

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(%provider, body = truncate(&body, MAX_ERROR_BODY), "Failed to parse provider response: {}", e);
        Error::provider(provider, format!("error decoding response body: {e}"))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
