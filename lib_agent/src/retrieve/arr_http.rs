//! # Retrying HTTP Client for the *arr APIs
//!
//! A thin, resilient wrapper around `reqwest` with middleware support for
//! exponential-backoff retries and standardized JSON handling. Radarr and
//! Sonarr authenticate with an `X-Api-Key` header; every request carries a
//! hard timeout so a hung upstream can never stall a collection cycle slot
//! indefinitely.

use std::time::Duration;

use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::error::AgentError;

const API_KEY_HEADER: &str = "X-Api-Key";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// A middleware-enabled HTTP client bound to one *arr installation.
#[derive(Clone)]
pub struct ArrHttp {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// The installation's API key, sent on every request.
    api_key: String,
}

impl ArrHttp {
    /// Creates a client with the default retry policy.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AgentError> {
        Self::with_retries(base_url, api_key, DEFAULT_MAX_RETRIES)
    }

    /// Creates a client with an explicit retry budget.
    ///
    /// The base URL is normalized to a trailing slash so relative endpoint
    /// paths join against the full prefix rather than replacing its last
    /// segment.
    pub fn with_retries(base_url: &str, api_key: &str, max_retries: u32) -> Result<Self, AgentError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let url = Url::parse(&normalized)
            .map_err(|e| AgentError::InvalidRequest(format!("invalid service url {base_url:?}: {e}")))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        let inner = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            base_url: url,
            api_key: api_key.to_string(),
        })
    }

    /// GET a JSON document from a relative endpoint path.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AgentError> {
        self.request(Method::GET, path, &[], None::<&()>).await
    }

    /// GET a JSON document with query parameters.
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AgentError> {
        self.request(Method::GET, path, query, None::<&()>).await
    }

    /// POST a JSON body and deserialize the JSON response.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AgentError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, AgentError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AgentError::Upstream(format!("invalid endpoint path {path:?}: {e}")))?;

        let mut req = self
            .inner
            .request(method, full_url)
            .header(API_KEY_HEADER, &self.api_key);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let response = req
            .send()
            .await
            .map_err(|e| AgentError::Upstream(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let snippet: String = error_body.chars().take(300).collect();
            return Err(AgentError::Upstream(format!("{path} returned {status}: {snippet}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::Upstream(format!("{path} returned malformed JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_normalization() {
        let client = ArrHttp::new("http://localhost:7878", "key").unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:7878/");
        // A trailing slash is not doubled.
        let client = ArrHttp::new("http://localhost:7878/", "key").unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:7878/");
    }

    #[test]
    fn rejects_relative_urls() {
        assert!(ArrHttp::new("localhost:7878", "key").is_err() || ArrHttp::new("not a url", "key").is_err());
        assert!(ArrHttp::new("", "key").is_err());
    }
}
