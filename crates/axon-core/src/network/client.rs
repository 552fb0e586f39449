//! HTTP client wrapper shared by adapters and the downloader.
//!
//! Provides a wrapper around reqwest with:
//! - A fixed user agent and configurable timeout
//! - Optional authorization header injection (bearer token by default)
//! - Status helpers for retry/permanent-failure decisions

use crate::config::NetworkConfig;
use crate::{AxonError, Result};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// HTTP client with authorization passthrough.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    /// Full `Authorization` header value, e.g. `Bearer hf_xxx`.
    authorization: Option<String>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| AxonError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            authorization: None,
            timeout,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request. Blank tokens are ignored.
    pub fn with_bearer_token(self, token: Option<&str>) -> Self {
        let value = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| format!("Bearer {}", t));
        self.with_authorization(value)
    }

    /// Send a raw `Authorization` header value (e.g. GitHub's `token <t>` form).
    pub fn with_authorization(mut self, value: Option<String>) -> Self {
        self.authorization = value;
        self
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_authorization(&self) -> bool {
        self.authorization.is_some()
    }

    /// Start a GET with the authorization header applied.
    pub fn get_request(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.authorization {
            Some(value) => request.header(header::AUTHORIZATION, value.as_str()),
            None => request,
        }
    }

    /// Make a GET request. Non-success statuses are returned, not raised.
    pub async fn get(&self, url: &str) -> Result<Response> {
        debug!("GET {}", url);
        self.get_request(url)
            .send()
            .await
            .map_err(|e| map_send_error(e, "GET", url, self.timeout))
    }

    /// GET that fails on any non-success status.
    ///
    /// `404` becomes [`AxonError::RemoteNotFound`]; other statuses become
    /// [`AxonError::Network`].
    pub async fn get_success(&self, url: &str) -> Result<Response> {
        let response = self.get(url).await?;
        ensure_success(response, url)
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get_success(url).await?;
        response.json::<T>().await.map_err(|e| AxonError::Network {
            message: format!("Invalid JSON from {}: {}", url, e),
            source: Some(e),
        })
    }

    /// GET and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get_success(url).await?;
        response.text().await.map_err(|e| AxonError::Network {
            message: format!("Failed to read body from {}: {}", url, e),
            source: Some(e),
        })
    }

    /// Check if an HTTP status code indicates a retryable error.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }

    /// Check if an HTTP status code indicates a permanent failure.
    pub fn is_permanent_failure(status: StatusCode) -> bool {
        matches!(status.as_u16(), 400 | 401 | 403 | 404)
    }
}

/// Turn a non-success response into the matching error.
pub fn ensure_success(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(AxonError::RemoteNotFound {
            model: url.to_string(),
        });
    }
    Err(AxonError::network(format!("GET {} returned status {}", url, status)))
}

fn map_send_error(err: reqwest::Error, method: &str, url: &str, timeout: Duration) -> AxonError {
    if err.is_timeout() {
        AxonError::Timeout(timeout)
    } else {
        AxonError::Network {
            message: format!("{} {} failed: {}", method, url, err),
            source: Some(err),
        }
    }
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
