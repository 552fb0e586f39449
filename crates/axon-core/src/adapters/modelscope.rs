//! ModelScope adapter.
//!
//! Identifiers look like `modelscope/<owner>/<model>` (alias `ms`). The files
//! API supplies metadata and the file list; when it is unavailable a basic
//! manifest is built once the model page has been probed.

use super::io_schema::generic_io;
use super::{fetch_available, HttpAdapterConfig, RepositoryAdapter, SearchResult};
use crate::cancel::CancellationToken;
use crate::config::AdapterDefaults;
use crate::identifier::{ModelIdentifier, LATEST};
use crate::manifest::{update_with_checksum, Compute, Framework, Manifest, ModelFile};
use crate::network::{Downloader, ExistenceProbe, HttpClient, ProbeVerdict, ProgressCallback};
use crate::package::PackageBuilder;
use crate::{AxonError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const FORMAT_TYPE: &str = "modelscope";
const DEFAULT_FILE: &str = "model.tar.gz";

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    description: String,
    #[serde(default)]
    framework: String,
    #[serde(default)]
    license: String,
    #[serde(default)]
    files: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    path: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    models: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    name: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    description: String,
}

/// ModelScope adapter.
#[derive(Debug, Clone)]
pub struct ModelScopeAdapter {
    base_url: String,
    http: Arc<HttpClient>,
    downloader: Downloader,
    probe: ExistenceProbe,
}

impl ModelScopeAdapter {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpAdapterConfig::new(AdapterDefaults::MODELSCOPE_BASE))
    }

    pub fn with_config(config: HttpAdapterConfig) -> Result<Self> {
        let http = Arc::new(config.build_client()?);
        Ok(Self {
            base_url: config.base_url,
            downloader: Downloader::new(http.clone()),
            http,
            probe: ExistenceProbe::new()?,
        })
    }

    fn model_url(&self, owner: &str, model: &str) -> String {
        format!("{}/models/{}/{}", self.base_url, owner, model)
    }

    /// Raw file URL inside the model repository on the default revision.
    pub fn file_url(&self, owner: &str, model: &str, path: &str) -> String {
        format!(
            "{}/models/{}/{}/repo?Revision=master&FilePath={}",
            self.base_url,
            owner,
            model,
            urlencoding::encode(path)
        )
    }

    async fn fetch_info(&self, owner: &str, model: &str) -> Result<ModelInfo> {
        let url = format!("{}/api/v1/models/{}/{}", self.base_url, owner, model);
        self.http.get_json(&url).await
    }

    fn base_manifest(&self, id: &ModelIdentifier, model_url: String) -> Manifest {
        let mut manifest = Manifest::for_identifier(id);
        manifest.metadata.homepage = Some(model_url.clone());
        manifest.spec.format.format_type = FORMAT_TYPE.to_string();
        manifest.spec.io = generic_io();
        manifest.spec.requirements.compute = Compute::baseline();
        manifest.distribution.package.url = model_url;
        manifest.distribution.registry.url = self.base_url.clone();
        manifest.distribution.registry.namespace = "modelscope".to_string();
        manifest
    }

    fn basic_manifest(&self, id: &ModelIdentifier, owner: &str, model: &str) -> Manifest {
        let mut manifest = self.base_manifest(id, self.model_url(owner, model));
        manifest.metadata.description = format!("Model from ModelScope: {}/{}", owner, model);
        manifest.metadata.license = "Unknown".to_string();
        manifest.spec.framework = Framework {
            name: "PyTorch".to_string(),
            version: LATEST.to_string(),
        };
        manifest.spec.format.files = vec![ModelFile::pending(DEFAULT_FILE)];
        manifest
    }
}

/// Split `<owner>/<model>`; the model part may contain further segments.
fn split_name(name: &str) -> Result<(&str, &str)> {
    match name.split_once('/') {
        Some((owner, model)) if !owner.is_empty() && !model.is_empty() => Ok((owner, model)),
        _ => Err(AxonError::InvalidIdentifier {
            input: name.to_string(),
            message: "expected ModelScope name owner/model_name".to_string(),
        }),
    }
}

#[async_trait]
impl RepositoryAdapter for ModelScopeAdapter {
    fn name(&self) -> &str {
        "modelscope"
    }

    fn can_handle(&self, namespace: &str, _name: &str) -> bool {
        namespace == "modelscope" || namespace == "ms"
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
            Ok(verdict) => debug!("Probe for {}: {:?}", id, verdict),
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => warn!("Existence probe for {} inconclusive: {}", model_url, e),
        }

        let info = match cancel.run(self.fetch_info(owner, model)).await {
            Ok(info) => info,
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => {
                debug!("ModelScope API unavailable for {} ({}), using basic manifest", id, e);
                return Ok(self.basic_manifest(id, owner, model));
            }
        };

        let mut manifest = self.base_manifest(id, model_url);
        manifest.metadata.description = info.description;
        manifest.metadata.license = info.license;
        manifest.spec.framework = Framework {
            name: info.framework,
            version: LATEST.to_string(),
        };
        manifest.spec.format.files = info
            .files
            .into_iter()
            .map(|f| ModelFile {
                size: f.size,
                ..ModelFile::pending(f.path)
            })
            .collect();
        if manifest.spec.format.files.is_empty() {
            manifest.spec.format.files = vec![ModelFile::pending(DEFAULT_FILE)];
        }
        Ok(manifest)
    }

    async fn materialize(
        &self,
        manifest: &mut Manifest,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (owner, model) = split_name(&manifest.metadata.name)?;
        let mut requests: Vec<(String, String)> = manifest
            .spec
            .format
            .files
            .iter()
            .map(|f| (f.path.clone(), self.file_url(owner, model, &f.path)))
            .collect();
        if requests.is_empty() {
            requests.push((
                DEFAULT_FILE.to_string(),
                self.file_url(owner, model, DEFAULT_FILE),
            ));
        }

        let mut builder = PackageBuilder::new()?;
        let fetched = fetch_available(
            &self.downloader,
            &mut builder,
            &manifest.full_version(),
            &requests,
            progress,
            cancel,
        )
        .await?;

        manifest
            .spec
            .format
            .files
            .retain(|f| fetched.contains(&f.path));
        if manifest.spec.format.files.is_empty() {
            manifest.spec.format.files = fetched.iter().map(ModelFile::pending).collect();
        }
        builder.build(destination)?;
        update_with_checksum(manifest, destination)?;
        info!(
            "Packaged {}/{} file(s) for {}",
            fetched.len(),
            requests.len(),
            manifest.full_version()
        );
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/api/v1/models?Keyword={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let response = self.http.get(&url).await?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let parsed: SearchResponse = response.json().await.unwrap_or_default();

        Ok(parsed
            .data
            .models
            .into_iter()
            .map(|m| SearchResult {
                namespace: "modelscope".to_string(),
                name: format!("{}/{}", m.owner, m.name),
                version: LATEST.to_string(),
                description: m.description,
                framework: None,
                tags: Vec::new(),
            })
            .collect())
    }
}
