//! PyTorch Hub adapter.
//!
//! Identifiers look like `pytorch/<repo>/<model>` (e.g. `pytorch/vision/resnet50`)
//! and map to the `pytorch/<repo>` GitHub repository. Weights come from the
//! repository's latest release assets when it has any, otherwise from URLs
//! scraped out of `hubconf.py`.

use super::hubconf::{extract_urls, file_name_from_url, known_models};
use super::io_schema::generic_io;
use super::{fetch_available, RepositoryAdapter, SearchResult};
use crate::cancel::CancellationToken;
use crate::config::{AdapterDefaults, NetworkConfig};
use crate::identifier::{ModelIdentifier, LATEST};
use crate::manifest::{update_with_checksum, Compute, Framework, Manifest, ModelFile};
use crate::network::{Downloader, ExistenceProbe, HttpClient, ProbeVerdict, ProgressCallback};
use crate::package::PackageBuilder;
use crate::{AxonError, Result};
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const GITHUB_ORG: &str = "pytorch";
const HUBCONF_BRANCHES: &[&str] = &["main", "master"];
const WEIGHT_EXTENSIONS: &[&str] = &[".pth", ".pt", ".pkl"];

/// Endpoints and credentials for the PyTorch Hub adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyTorchHubConfig {
    pub github_base: String,
    pub api_base: String,
    pub raw_base: String,
    /// GitHub token, sent as `Authorization: token <t>` to raise rate limits.
    pub github_token: Option<String>,
    pub timeout: Duration,
}

impl Default for PyTorchHubConfig {
    fn default() -> Self {
        Self {
            github_base: AdapterDefaults::GITHUB_BASE.to_string(),
            api_base: AdapterDefaults::GITHUB_API_BASE.to_string(),
            raw_base: AdapterDefaults::GITHUB_RAW_BASE.to_string(),
            github_token: None,
            timeout: NetworkConfig::REQUEST_TIMEOUT,
        }
    }
}

impl PyTorchHubConfig {
    /// Point every endpoint at one base URL (used by tests and mirrors).
    pub fn with_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.github_base = base.to_string();
        self.api_base = base.to_string();
        self.raw_base = base.to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.github_token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// PyTorch Hub adapter.
#[derive(Debug, Clone)]
pub struct PyTorchHubAdapter {
    config: PyTorchHubConfig,
    http: Arc<HttpClient>,
    downloader: Downloader,
    probe: ExistenceProbe,
}

impl PyTorchHubAdapter {
    pub fn new() -> Result<Self> {
        Self::with_config(PyTorchHubConfig::default())
    }

    pub fn with_config(config: PyTorchHubConfig) -> Result<Self> {
        let http = Arc::new(
            HttpClient::with_timeout(config.timeout)?
                .with_authorization(config.github_token.as_ref().map(|t| format!("token {}", t))),
        );
        Ok(Self {
            downloader: Downloader::new(http.clone()),
            http,
            probe: ExistenceProbe::new()?,
            config,
        })
    }

    fn github_repo(repo: &str) -> String {
        format!("{}/{}", GITHUB_ORG, repo)
    }

    /// Fetch `hubconf.py`, trying each default branch.
    async fn fetch_hubconf(&self, repo: &str) -> Option<String> {
        for branch in HUBCONF_BRANCHES {
            let url = format!(
                "{}/{}/{}/hubconf.py",
                self.config.raw_base,
                Self::github_repo(repo),
                branch
            );
            match self.http.get_text(&url).await {
                Ok(text) => return Some(text),
                Err(e) => debug!("hubconf.py not available at {}: {}", url, e),
            }
        }
        None
    }

    /// Weight assets of the latest GitHub release.
    async fn release_assets(&self, repo: &str) -> Vec<(String, String)> {
        let url = format!(
            "{}/repos/{}/releases/latest",
            self.config.api_base,
            Self::github_repo(repo)
        );
        let request = self
            .http
            .get_request(&url)
            .header(header::ACCEPT, "application/vnd.github.v3+json");

        let release: Release = match request.send().await {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(release) => release,
                Err(e) => {
                    debug!("Unparseable release info for {}: {}", repo, e);
                    return Vec::new();
                }
            },
            Ok(response) => {
                debug!("No release info for {} (status {})", repo, response.status());
                return Vec::new();
            }
            Err(e) => {
                debug!("Release lookup for {} failed: {}", repo, e);
                return Vec::new();
            }
        };

        release
            .assets
            .into_iter()
            .filter(|a| WEIGHT_EXTENSIONS.iter().any(|ext| a.name.ends_with(ext)))
            .map(|a| (a.name, a.browser_download_url))
            .collect()
    }
}

/// Split `<repo>/<model>`.
fn split_name(name: &str) -> Result<(&str, &str)> {
    match name.split_once('/') {
        Some((repo, model)) if !repo.is_empty() && !model.is_empty() => Ok((repo, model)),
        _ => Err(AxonError::InvalidIdentifier {
            input: name.to_string(),
            message: "expected PyTorch Hub name repo/model_name".to_string(),
        }),
    }
}

#[async_trait]
impl RepositoryAdapter for PyTorchHubAdapter {
    fn name(&self) -> &str {
        "pytorch-hub"
    }

    fn can_handle(&self, namespace: &str, _name: &str) -> bool {
        namespace == "pytorch" || namespace == "torch"
    }

    async fn describe(&self, id: &ModelIdentifier, cancel: &CancellationToken) -> Result<Manifest> {
        let (repo, model) = split_name(id.name())?;
        let repo_url = format!("{}/{}", self.config.github_base, Self::github_repo(repo));

        match self.probe.probe(&repo_url, cancel).await {
            Ok(ProbeVerdict::Absent) => {
                return Err(AxonError::RemoteNotFound {
                    model: format!("{} (repository {})", id, Self::github_repo(repo)),
                })
            }
            Ok(_) => {}
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => warn!("Existence probe for {} inconclusive: {}", repo_url, e),
        }

        let hubconf = cancel
            .run(async { Ok::<_, AxonError>(self.fetch_hubconf(repo).await) })
            .await?;
        if let Some(content) = hubconf {
            if extract_urls(&content, model).is_empty() {
                return Err(AxonError::RemoteNotFound {
                    model: format!("{} (not listed in hubconf.py)", id),
                });
            }
        }

        let mut manifest = Manifest::for_identifier(id);
        manifest.metadata.description = format!("Model from PyTorch Hub: {}/{}", repo, model);
        manifest.metadata.license = "BSD-3-Clause".to_string();
        manifest.metadata.homepage = Some(repo_url.clone());
        manifest.spec.framework = Framework {
            name: "PyTorch".to_string(),
            version: "2.0.0".to_string(),
        };
        manifest.spec.format.format_type = "pytorch".to_string();
        manifest.spec.format.files = vec![ModelFile::pending(format!("{}.pth", model))];
        manifest.spec.io = generic_io();
        manifest.spec.requirements.compute = Compute::baseline();
        manifest.distribution.package.url = repo_url;
        manifest.distribution.registry.url = AdapterDefaults::PYTORCH_HUB_BASE.to_string();
        manifest.distribution.registry.namespace = "pytorch".to_string();
        Ok(manifest)
    }

    async fn materialize(
        &self,
        manifest: &mut Manifest,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (repo, model) = split_name(&manifest.metadata.name)?;
        let label = format!("{}/{}", Self::github_repo(repo), model);
        let mut builder = PackageBuilder::new()?;

        let assets = cancel
            .run(async { Ok::<_, AxonError>(self.release_assets(repo).await) })
            .await?;
        let mut fetched = Vec::new();
        if !assets.is_empty() {
            match fetch_available(&self.downloader, &mut builder, &label, &assets, progress, cancel)
                .await
            {
                Ok(files) => fetched = files,
                Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
                Err(e) => debug!("Release assets unusable for {}: {}", label, e),
            }
        }

        if fetched.is_empty() {
            let content = cancel
                .run(async { Ok::<_, AxonError>(self.fetch_hubconf(repo).await) })
                .await?
                .unwrap_or_default();
            let requests: Vec<(String, String)> = extract_urls(&content, model)
                .into_iter()
                .map(|url| (file_name_from_url(&url), url))
                .collect();
            if requests.is_empty() {
                return Err(AxonError::RemoteNotFound {
                    model: format!("{} (no weight URLs found)", label),
                });
            }
            fetched =
                fetch_available(&self.downloader, &mut builder, &label, &requests, progress, cancel)
                    .await?;
        }

        manifest.spec.format.files = fetched.iter().map(ModelFile::pending).collect();
        builder.build(destination)?;
        update_with_checksum(manifest, destination)?;
        info!("Packaged {} weight file(s) for {}", fetched.len(), label);
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.to_lowercase();
        Ok(known_models()
            .filter(|name| name.contains(&query))
            .map(|name| SearchResult {
                namespace: "pytorch".to_string(),
                name: format!("vision/{}", name),
                version: LATEST.to_string(),
                description: format!("torchvision {} checkpoint", name),
                framework: Some("PyTorch".to_string()),
                tags: vec!["vision".to_string()],
            })
            .collect())
    }
}
