//! Generic Axon HTTP registry.
//!
//! Surface consumed:
//! - `GET <base>/search?q=<query>` returns a JSON array of search results
//! - `GET <base>/models/<ns>/<name>/<version>/manifest` returns the manifest
//! - package bytes at the manifest's package URL or one of its mirrors
//!
//! Configured registry mirrors are alternate bases tried in order when the
//! primary registry cannot answer.

use super::{HttpAdapterConfig, RepositoryAdapter, SearchResult};
use crate::cancel::CancellationToken;
use crate::identifier::ModelIdentifier;
use crate::manifest::{self, update_with_checksum, Manifest};
use crate::network::{Downloader, HttpClient, ProgressCallback};
use crate::{AxonError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespaces owned by the built-in hub adapters.
const HUB_NAMESPACES: &[&str] = &[
    "hf",
    "huggingface",
    "pytorch",
    "torch",
    "modelscope",
    "ms",
    "tfhub",
    "tf",
];

/// Adapter for a self-hosted Axon registry.
#[derive(Debug, Clone)]
pub struct LocalRegistryAdapter {
    bases: Vec<String>,
    http: Arc<HttpClient>,
    downloader: Downloader,
    verify_checksums: bool,
}

impl LocalRegistryAdapter {
    pub fn new(config: HttpAdapterConfig, mirrors: Vec<String>) -> Result<Self> {
        let http = Arc::new(config.build_client()?);
        let mut bases = vec![config.base_url];
        bases.extend(
            mirrors
                .into_iter()
                .map(|m| m.trim().trim_end_matches('/').to_string())
                .filter(|m| !m.is_empty()),
        );
        Ok(Self {
            bases,
            downloader: Downloader::new(http.clone()),
            http,
            verify_checksums: true,
        })
    }

    /// Skip digest verification of downloaded packages.
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn base_url(&self) -> &str {
        self.bases.first().map(String::as_str).unwrap_or("")
    }

    fn manifest_path(id: &ModelIdentifier) -> String {
        format!(
            "models/{}/{}/{}/manifest",
            id.namespace(),
            id.name(),
            id.version()
        )
    }

    async fn fetch_manifest(&self, base: &str, id: &ModelIdentifier) -> Result<Manifest> {
        let url = format!("{}/{}", base, Self::manifest_path(id));
        let response = self.http.get_success(&url).await?;
        let bytes = response.bytes().await.map_err(|e| AxonError::Network {
            message: format!("Failed to read manifest from {}: {}", url, e),
            source: Some(e),
        })?;
        let fetched = manifest::parse_bytes(&bytes)?;
        manifest::validate_file_paths(&fetched)?;
        Ok(fetched)
    }
}

#[async_trait]
impl RepositoryAdapter for LocalRegistryAdapter {
    fn name(&self) -> &str {
        "local"
    }

    fn can_handle(&self, namespace: &str, _name: &str) -> bool {
        !HUB_NAMESPACES.contains(&namespace) && !self.base_url().is_empty()
    }

    async fn describe(&self, id: &ModelIdentifier, cancel: &CancellationToken) -> Result<Manifest> {
        let mut last_error = None;
        for base in &self.bases {
            match cancel.run(self.fetch_manifest(base, id)).await {
                Ok(manifest) => {
                    debug!("Fetched manifest for {} from {}", id, base);
                    return Ok(manifest);
                }
                Err(e @ AxonError::Cancelled) => return Err(e),
                Err(e @ AxonError::RemoteNotFound { .. }) => {
                    debug!("{} not on {}", id, base);
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!("Registry {} failed for {}: {}", base, id, e);
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(AxonError::RemoteNotFound { .. }) | None => AxonError::RemoteNotFound {
                model: id.to_string(),
            },
            Some(e) => e,
        })
    }

    async fn materialize(
        &self,
        manifest: &mut Manifest,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let sources = manifest.package_sources();
        let expected = if self.verify_checksums {
            Some(manifest.distribution.package.sha256.clone())
        } else {
            None
        };

        let outcome = self
            .downloader
            .download_from_sources(&sources, destination, expected.as_deref(), progress, cancel)
            .await?;
        info!(
            "Downloaded package for {} from {} ({} bytes)",
            manifest.full_version(),
            outcome.url,
            outcome.bytes
        );

        update_with_checksum(manifest, destination)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let mut last_error = None;
        for base in &self.bases {
            let url = format!("{}/search?q={}", base, urlencoding::encode(query));
            match self.http.get_json::<Vec<SearchResult>>(&url).await {
                Ok(results) => return Ok(results),
                Err(e) => {
                    debug!("Search on {} failed: {}", base, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AxonError::Config {
            message: "no registry URL configured".to_string(),
        }))
    }
}
