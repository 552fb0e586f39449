//! Repository adapters: one strategy per remote model source.
//!
//! Every adapter speaks the same contract ([`RepositoryAdapter`]); the
//! [`AdapterRegistry`] picks the first one whose `can_handle` predicate
//! accepts an identifier.
//!
//! # Module Organization
//!
//! - [`registry`] - Ordered first-match adapter chain
//! - [`local`] - Generic Axon HTTP registry with mirrors
//! - [`huggingface`] - Hugging Face Hub (catch-all)
//! - [`modelscope`] - ModelScope files API
//! - [`pytorch_hub`] - PyTorch Hub via `hubconf.py` scraping
//! - [`tensorflow_hub`] - TensorFlow Hub
//! - [`replicate`] - API-hosted inference provider
//! - [`io_schema`] - Tensor schema inference from `config.json`

mod hubconf;
pub mod huggingface;
pub mod io_schema;
pub mod local;
pub mod modelscope;
pub mod pytorch_hub;
pub mod registry;
pub mod replicate;
pub mod tensorflow_hub;

pub use huggingface::HuggingFaceAdapter;
pub use local::LocalRegistryAdapter;
pub use modelscope::ModelScopeAdapter;
pub use pytorch_hub::PyTorchHubAdapter;
pub use registry::AdapterRegistry;
pub use replicate::ReplicateAdapter;
pub use tensorflow_hub::TensorFlowHubAdapter;

use crate::cancel::CancellationToken;
use crate::identifier::ModelIdentifier;
use crate::manifest::Manifest;
use crate::network::{Downloader, HttpClient, ProgressCallback};
use crate::package::PackageBuilder;
use crate::{AxonError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One search hit from an adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Strategy for describing and fetching models from one remote source.
///
/// Implementations differ only in how `describe` and `materialize` reach the
/// network.
#[async_trait]
pub trait RepositoryAdapter: Send + Sync {
    /// Stable adapter name (`huggingface`, `local`, ...).
    fn name(&self) -> &str;

    /// Whether this adapter accepts the identifier.
    fn can_handle(&self, namespace: &str, name: &str) -> bool;

    /// Build a manifest for `id`, probing for existence where the source allows it.
    async fn describe(&self, id: &ModelIdentifier, cancel: &CancellationToken) -> Result<Manifest>;

    /// Write one self-contained package to `destination`.
    ///
    /// On success the manifest's package digest and size describe the
    /// archive that was actually written.
    async fn materialize(
        &self,
        manifest: &mut Manifest,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Shared adapter handle.
pub type DynAdapter = Arc<dyn RepositoryAdapter>;

/// Connection settings for an HTTP-backed adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAdapterConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl HttpAdapterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: crate::config::NetworkConfig::REQUEST_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// HTTP client carrying this config's timeout and bearer token.
    pub fn build_client(&self) -> Result<HttpClient> {
        Ok(HttpClient::with_timeout(self.timeout)?.with_bearer_token(self.token.as_deref()))
    }
}

/// Download whichever of `files` are available into the package.
///
/// Missing or failing files are skipped; cancellation aborts. Fails with
/// [`AxonError::PartialSourceFailure`] only when nothing was obtained.
pub(crate) async fn fetch_available(
    downloader: &Downloader,
    builder: &mut PackageBuilder,
    model: &str,
    files: &[(String, String)],
    progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    let mut fetched = Vec::new();
    for (relative, url) in files {
        cancel.check()?;
        let target = builder.reserve(relative)?;
        match downloader.download(url, &target, progress, cancel).await {
            Ok(bytes) => {
                debug!("Fetched {} ({} bytes)", relative, bytes);
                fetched.push(relative.clone());
            }
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => {
                debug!("Skipping {} for {}: {}", relative, model, e);
                builder.discard(relative);
            }
        }
    }

    if fetched.is_empty() {
        warn!("No files could be downloaded for {}", model);
        return Err(AxonError::PartialSourceFailure {
            model: model.to_string(),
            attempted: files.len(),
        });
    }
    if fetched.len() < files.len() {
        debug!(
            "Fetched {}/{} files for {}",
            fetched.len(),
            files.len(),
            model
        );
    }
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_adapter_config_builder() {
        let config = HttpAdapterConfig::new("https://hub.example/")
            .with_token(Some("  ".into()))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "https://hub.example");
        assert!(config.token.is_none());
        assert_eq!(config.timeout, Duration::from_secs(5));

        let config = config.with_token(Some("secret".into()));
        assert_eq!(config.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_search_result_defaults() {
        let result: SearchResult =
            serde_json::from_str(r#"{"namespace":"hf","name":"bert"}"#).unwrap();
        assert_eq!(result.name, "bert");
        assert!(result.version.is_empty());
        assert!(result.framework.is_none());
    }
}
