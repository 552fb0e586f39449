//! Cheap existence probe for hosts without a first-class existence API.
//!
//! Issues a ranged GET for the first KiB, follows a bounded number of
//! redirects and classifies the response:
//! - `404` means absent
//! - `416` means present (file shorter than the requested range)
//! - success with non-HTML content means present
//! - success with HTML is sniffed for search/browse page markers, and a
//!   redirect that ends on a generic listing page counts as absent
//! - anything else is indeterminate and treated as "might exist"

use crate::cancel::CancellationToken;
use crate::config::{NetworkConfig, ProbeConfig};
use crate::{AxonError, Result};
use futures::StreamExt;
use reqwest::{header, redirect, Client, StatusCode};
use tracing::debug;

/// Title prefixes of hub search and browse pages.
const LISTING_TITLE_MARKERS: &[&str] = &["<title>find pre-trained models", "<title>search"];

/// Final path segments of generic listing pages.
const LISTING_PATH_SUFFIXES: &[&str] = &["/models", "/search", "/browse"];

/// Outcome of an existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Exists,
    Absent,
    /// Status that proves nothing either way (auth required, 5xx, ...).
    Indeterminate(u16),
}

impl ProbeVerdict {
    /// Whether an adapter should proceed as if the model exists.
    pub fn might_exist(&self) -> bool {
        !matches!(self, ProbeVerdict::Absent)
    }
}

/// Ranged-GET existence probe.
#[derive(Debug, Clone)]
pub struct ExistenceProbe {
    client: Client,
}

impl ExistenceProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(ProbeConfig::TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .redirect(redirect::Policy::limited(ProbeConfig::MAX_REDIRECTS))
            .build()
            .map_err(|e| AxonError::Network {
                message: format!("Failed to create probe client: {}", e),
                source: Some(e),
            })?;
        Ok(Self { client })
    }

    /// Probe `url`. Transport failures are returned as errors so the caller
    /// can decide whether to fall back.
    pub async fn probe(&self, url: &str, cancel: &CancellationToken) -> Result<ProbeVerdict> {
        let request = self
            .client
            .get(url)
            .header(header::RANGE, format!("bytes=0-{}", ProbeConfig::RANGE_BYTES - 1));

        let response = cancel
            .run(async {
                request.send().await.map_err(|e| AxonError::Network {
                    message: format!("Probe of {} failed: {}", url, e),
                    source: Some(e),
                })
            })
            .await?;

        let status = response.status();
        let redirected = response.url().as_str() != url;
        let final_path = response.url().path().trim_end_matches('/').to_lowercase();

        let verdict = match status {
            StatusCode::NOT_FOUND => ProbeVerdict::Absent,
            StatusCode::RANGE_NOT_SATISFIABLE => ProbeVerdict::Exists,
            s if s.is_success() => {
                let is_html = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_lowercase().contains("text/html"))
                    .unwrap_or(false);

                if !is_html {
                    ProbeVerdict::Exists
                } else if redirected && is_listing_path(&final_path) {
                    debug!("Probe of {} redirected to listing page {}", url, final_path);
                    ProbeVerdict::Absent
                } else {
                    let head = read_prefix(response, ProbeConfig::BODY_SNIFF_BYTES, cancel).await?;
                    if is_listing_page(&head) {
                        ProbeVerdict::Absent
                    } else {
                        ProbeVerdict::Exists
                    }
                }
            }
            s => ProbeVerdict::Indeterminate(s.as_u16()),
        };

        debug!("Probe {} -> {:?} (status {})", url, verdict, status);
        Ok(verdict)
    }
}

/// Read at most `limit` bytes of the body, lowercased.
async fn read_prefix(
    response: reqwest::Response,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut buf = Vec::with_capacity(limit);
    let mut stream = response.bytes_stream();
    while buf.len() < limit {
        cancel.check()?;
        match stream.next().await {
            Some(Ok(chunk)) => {
                let take = (limit - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            // A truncated body still carries whatever title it had.
            Some(Err(_)) | None => break,
        }
    }
    Ok(String::from_utf8_lossy(&buf).to_lowercase())
}

fn is_listing_page(lowercase_html: &str) -> bool {
    LISTING_TITLE_MARKERS
        .iter()
        .any(|marker| lowercase_html.contains(marker))
}

fn is_listing_path(lowercase_path: &str) -> bool {
    LISTING_PATH_SUFFIXES
        .iter()
        .any(|suffix| lowercase_path.ends_with(suffix))
}
