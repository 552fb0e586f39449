//! TensorFlow Hub adapter.
//!
//! Identifiers look like `tfhub/<publisher>/<model path>[@version]`. Metadata
//! comes from `<model url>?format=json`; when that is unavailable the model
//! is probed and, if it might exist, a basic SavedModel manifest is returned.

use super::io_schema::generic_io;
use super::{fetch_available, HttpAdapterConfig, RepositoryAdapter, SearchResult};
use crate::cancel::CancellationToken;
use crate::config::AdapterDefaults;
use crate::identifier::{ModelIdentifier, LATEST};
use crate::manifest::{
    update_with_checksum, Compute, Framework, Io, Manifest, ModelFile, TensorSpec,
};
use crate::network::{Downloader, ExistenceProbe, HttpClient, ProbeVerdict, ProgressCallback};
use crate::package::PackageBuilder;
use crate::{AxonError, Result};
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SAVED_MODEL: &str = "saved_model";
const TFLITE: &str = "tflite";

#[derive(Debug, Deserialize)]
struct ModelMetadata {
    #[serde(default)]
    description: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    inputs: Vec<TensorMetadata>,
    #[serde(default)]
    outputs: Vec<TensorMetadata>,
}

#[derive(Debug, Deserialize)]
struct TensorMetadata {
    name: String,
    dtype: String,
    #[serde(default)]
    shape: Vec<i64>,
}

impl From<TensorMetadata> for TensorSpec {
    fn from(t: TensorMetadata) -> Self {
        TensorSpec::new(&t.name, &t.dtype, &t.shape)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    publisher: String,
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
}

/// TensorFlow Hub adapter.
#[derive(Debug, Clone)]
pub struct TensorFlowHubAdapter {
    base_url: String,
    http: Arc<HttpClient>,
    downloader: Downloader,
    probe: ExistenceProbe,
}

impl TensorFlowHubAdapter {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpAdapterConfig::new(AdapterDefaults::TFHUB_BASE))
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

    /// `<base>/<publisher>/<path>[/<version>]`
    pub fn model_url(&self, name: &str, version: &str) -> Result<String> {
        let (publisher, path) = split_name(name)?;
        let mut url = format!("{}/{}/{}", self.base_url, publisher, path);
        if !version.is_empty() && version != LATEST {
            url = format!("{}/{}", url, version);
        }
        Ok(url)
    }

    async fn fetch_metadata(&self, model_url: &str) -> Result<ModelMetadata> {
        let url = format!("{}?format=json", model_url);
        let response = self
            .http
            .get_request(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = crate::network::ensure_success(response, &url)?;
        response.json().await.map_err(|e| AxonError::Network {
            message: format!("Invalid metadata from {}: {}", url, e),
            source: Some(e),
        })
    }

    fn base_manifest(&self, id: &ModelIdentifier, model_url: &str) -> Manifest {
        let mut manifest = Manifest::for_identifier(id);
        manifest.metadata.license = "Apache-2.0".to_string();
        manifest.metadata.homepage = Some(model_url.to_string());
        manifest.spec.framework = Framework {
            name: "TensorFlow".to_string(),
            version: "2.0.0".to_string(),
        };
        manifest.spec.requirements.compute = Compute::baseline();
        manifest.distribution.package.url = model_url.to_string();
        manifest.distribution.registry.url = self.base_url.clone();
        manifest.distribution.registry.namespace = "tfhub".to_string();
        manifest
    }

    fn basic_manifest(&self, id: &ModelIdentifier, model_url: &str) -> Manifest {
        let mut manifest = self.base_manifest(id, model_url);
        manifest.metadata.description = format!("TensorFlow Hub model: {}", id.name());
        manifest.spec.format.format_type = SAVED_MODEL.to_string();
        manifest.spec.format.files = vec![ModelFile::pending("model.tar.gz")];
        manifest.spec.io = generic_io();
        manifest
    }
}

fn split_name(name: &str) -> Result<(&str, &str)> {
    match name.split_once('/') {
        Some((publisher, path)) if !publisher.is_empty() && !path.is_empty() => {
            Ok((publisher, path))
        }
        _ => Err(AxonError::InvalidIdentifier {
            input: name.to_string(),
            message: "expected TensorFlow Hub name publisher/model_path".to_string(),
        }),
    }
}

#[async_trait]
impl RepositoryAdapter for TensorFlowHubAdapter {
    fn name(&self) -> &str {
        "tensorflow-hub"
    }

    fn can_handle(&self, namespace: &str, _name: &str) -> bool {
        namespace == "tfhub" || namespace == "tf"
    }

    async fn describe(&self, id: &ModelIdentifier, cancel: &CancellationToken) -> Result<Manifest> {
        let model_url = self.model_url(id.name(), id.version())?;

        let metadata = match cancel.run(self.fetch_metadata(&model_url)).await {
            Ok(metadata) => metadata,
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => {
                debug!("No metadata for {} ({}), probing", id, e);
                return match self.probe.probe(&model_url, cancel).await {
                    Ok(ProbeVerdict::Absent) => Err(AxonError::RemoteNotFound {
                        model: id.to_string(),
                    }),
                    Err(AxonError::Cancelled) => Err(AxonError::Cancelled),
                    verdict => {
                        debug!("Probe for {}: {:?}, using basic manifest", id, verdict);
                        Ok(self.basic_manifest(id, &model_url))
                    }
                };
            }
        };

        let format = if metadata.format.trim().is_empty() {
            SAVED_MODEL.to_string()
        } else {
            metadata.format
        };
        let file = if format == TFLITE {
            "model.tflite"
        } else {
            "model.tar.gz"
        };

        let mut manifest = self.base_manifest(id, &model_url);
        manifest.metadata.description = metadata.description;
        manifest.spec.format.format_type = format;
        manifest.spec.format.files = vec![ModelFile::pending(file)];
        manifest.spec.io = Io {
            inputs: metadata.inputs.into_iter().map(Into::into).collect(),
            outputs: metadata.outputs.into_iter().map(Into::into).collect(),
        };
        if manifest.spec.io.inputs.is_empty() || manifest.spec.io.outputs.is_empty() {
            warn!("TensorFlow Hub metadata for {} lists no tensors, using generic I/O", id);
            manifest.spec.io = generic_io();
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
        let model_url = self.model_url(&manifest.metadata.name, &manifest.metadata.version)?;
        let file = manifest
            .spec
            .format
            .files
            .first()
            .map(|f| f.path.clone())
            .unwrap_or_else(|| "model.tar.gz".to_string());
        let requests = vec![(file, format!("{}?tf-hub-format=compressed", model_url))];

        let mut builder = PackageBuilder::new()?;
        fetch_available(
            &self.downloader,
            &mut builder,
            &manifest.full_version(),
            &requests,
            progress,
            cancel,
        )
        .await?;

        builder.build(destination)?;
        update_with_checksum(manifest, destination)?;
        info!(
            "Packaged {} ({} bytes)",
            manifest.full_version(),
            manifest.distribution.package.size
        );
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/api/v1/models?q={}",
            self.base_url,
            urlencoding::encode(query)
        );
        let response = self
            .http
            .get_request(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
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
                namespace: "tfhub".to_string(),
                name: format!("{}/{}", m.publisher, m.name),
                version: if m.version.is_empty() {
                    LATEST.to_string()
                } else {
                    m.version
                },
                description: m.description,
                framework: Some("TensorFlow".to_string()),
                tags: Vec::new(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_url() {
        let adapter = TensorFlowHubAdapter::new().unwrap();
        assert_eq!(
            adapter
                .model_url("google/imagenet/mobilenet_v2_100_224/classification", "latest")
                .unwrap(),
            "https://tfhub.dev/google/imagenet/mobilenet_v2_100_224/classification"
        );
        assert_eq!(
            adapter.model_url("google/universal-sentence-encoder", "4").unwrap(),
            "https://tfhub.dev/google/universal-sentence-encoder/4"
        );
        assert!(adapter.model_url("lonely", "latest").is_err());
    }

    #[test]
    fn test_basic_manifest() {
        let adapter = TensorFlowHubAdapter::new().unwrap();
        let id = ModelIdentifier::new("tfhub", "google/bert", "latest");
        let manifest = adapter.basic_manifest(&id, "https://tfhub.dev/google/bert");
        assert_eq!(manifest.spec.format.format_type, "saved_model");
        assert_eq!(manifest.spec.format.files[0].path, "model.tar.gz");
        assert_eq!(manifest.spec.io.inputs[0].shape, vec![-1, -1]);
        assert_eq!(manifest.distribution.registry.namespace, "tfhub");
    }

    #[test]
    fn test_namespaces() {
        let adapter = TensorFlowHubAdapter::new().unwrap();
        assert!(adapter.can_handle("tfhub", "google/bert"));
        assert!(adapter.can_handle("tf", "google/bert"));
        assert!(!adapter.can_handle("tensorflow", "google/bert"));
    }
}
