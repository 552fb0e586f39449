//! Replicate adapter.
//!
//! Replicate models run behind an inference API, so there are no weights to
//! fetch. The package holds a single `metadata.json` describing how to reach
//! the model. Not part of the default registry; register it explicitly.

use super::io_schema::generic_io;
use super::{HttpAdapterConfig, RepositoryAdapter, SearchResult};
use crate::cancel::CancellationToken;
use crate::config::{AdapterDefaults, NetworkConfig};
use crate::identifier::{ModelIdentifier, LATEST};
use crate::manifest::{update_with_checksum, Compute, Framework, Manifest, ModelFile};
use crate::network::{ExistenceProbe, HttpClient, ProbeVerdict, ProgressCallback};
use crate::package::PackageBuilder;
use crate::{AxonError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const METADATA_ENTRY: &str = "metadata.json";

/// Endpoints and credentials for the Replicate adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicateConfig {
    pub api_base: String,
    pub web_base: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_base: AdapterDefaults::REPLICATE_API_BASE.to_string(),
            web_base: AdapterDefaults::REPLICATE_WEB_BASE.to_string(),
            token: None,
            timeout: NetworkConfig::REQUEST_TIMEOUT,
        }
    }
}

impl ReplicateConfig {
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_bases(mut self, api_base: &str, web_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.web_base = web_base.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    owner: String,
    name: String,
    #[serde(default)]
    description: String,
}

/// Contents of the packaged `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiModelMetadata {
    pub adapter: String,
    pub model: String,
    pub version: String,
    pub api_url: String,
    pub description: String,
}

/// Replicate adapter.
#[derive(Debug, Clone)]
pub struct ReplicateAdapter {
    config: ReplicateConfig,
    http: HttpClient,
    probe: ExistenceProbe,
}

impl ReplicateAdapter {
    pub fn new() -> Result<Self> {
        Self::with_config(ReplicateConfig::default())
    }

    pub fn with_config(config: ReplicateConfig) -> Result<Self> {
        let http = HttpAdapterConfig::new(config.api_base.clone())
            .with_token(config.token.clone())
            .with_timeout(config.timeout)
            .build_client()?;
        Ok(Self {
            config,
            http,
            probe: ExistenceProbe::new()?,
        })
    }

    fn model_url(&self, owner: &str, model: &str) -> String {
        format!("{}/{}/{}", self.config.web_base, owner, model)
    }

    fn manifest_for(&self, id: &ModelIdentifier, model_url: String, description: String) -> Manifest {
        let mut manifest = Manifest::for_identifier(id);
        manifest.metadata.description = description;
        manifest.metadata.license = "Unknown".to_string();
        manifest.metadata.homepage = Some(model_url.clone());
        manifest.spec.framework = Framework {
            name: "Replicate".to_string(),
            version: LATEST.to_string(),
        };
        manifest.spec.format.format_type = "replicate".to_string();
        manifest.spec.format.files = vec![ModelFile::pending("model.api")];
        manifest.spec.io = generic_io();
        manifest.spec.requirements.compute = Compute::baseline();
        manifest.distribution.package.url = model_url;
        manifest.distribution.registry.url = self.config.api_base.clone();
        manifest.distribution.registry.namespace = "replicate".to_string();
        manifest
    }
}

fn split_name(name: &str) -> Result<(&str, &str)> {
    match name.split_once('/') {
        Some((owner, model)) if !owner.is_empty() && !model.is_empty() => Ok((owner, model)),
        _ => Err(AxonError::InvalidIdentifier {
            input: name.to_string(),
            message: "expected Replicate name owner/model_name".to_string(),
        }),
    }
}

#[async_trait]
impl RepositoryAdapter for ReplicateAdapter {
    fn name(&self) -> &str {
        "replicate"
    }

    fn can_handle(&self, namespace: &str, _name: &str) -> bool {
        namespace == "replicate" || namespace == "rep"
    }

    async fn describe(&self, id: &ModelIdentifier, cancel: &CancellationToken) -> Result<Manifest> {
        let (owner, model) = split_name(id.name())?;
        let model_url = self.model_url(owner, model);

        match self.probe.probe(&model_url, cancel).await {
            Ok(ProbeVerdict::Absent) => {
                return Err(AxonError::RemoteNotFound {
                    model: id.to_string(),
                })
            }
            Ok(_) => {}
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => warn!("Existence probe for {} inconclusive: {}", model_url, e),
        }

        let api_url = format!("{}/v1/models/{}/{}", self.config.api_base, owner, model);
        let description = match cancel.run(self.http.get_json::<ModelInfo>(&api_url)).await {
            Ok(info) => info.description,
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => {
                debug!("Replicate API unavailable for {}: {}", id, e);
                format!("Model from Replicate: {}/{}", owner, model)
            }
        };
        Ok(self.manifest_for(id, model_url, description))
    }

    async fn materialize(
        &self,
        manifest: &mut Manifest,
        destination: &Path,
        _progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancel.check()?;
        let metadata = ApiModelMetadata {
            adapter: self.name().to_string(),
            model: manifest.full_name(),
            version: manifest.metadata.version.clone(),
            api_url: manifest.distribution.package.url.clone(),
            description: manifest.metadata.description.clone(),
        };

        let mut builder = PackageBuilder::new()?;
        builder.add_bytes(METADATA_ENTRY, &serde_json::to_vec_pretty(&metadata)?)?;
        builder.build(destination)?;
        update_with_checksum(manifest, destination)?;
        info!("Packaged API metadata for {}", manifest.full_version());
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/v1/models/search?q={}",
            self.config.api_base,
            urlencoding::encode(query)
        );
        let response = self.http.get(&url).await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let Ok(parsed) = response.json::<SearchResponse>().await else {
            return Ok(Vec::new());
        };

        Ok(parsed
            .results
            .into_iter()
            .map(|m| SearchResult {
                namespace: "replicate".to_string(),
                name: format!("{}/{}", m.owner, m.name),
                version: LATEST.to_string(),
                description: m.description,
                framework: Some("Replicate".to_string()),
                tags: Vec::new(),
            })
            .collect())
    }
}
