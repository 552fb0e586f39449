//! Hugging Face Hub adapter.
//!
//! Registered last as the catch-all: it accepts every identifier. Files are
//! listed through `/api/models/{id}` and fetched from `resolve/main`.

use super::io_schema::{generic_io, io_from_config_bytes};
use super::{fetch_available, HttpAdapterConfig, RepositoryAdapter, SearchResult};
use crate::cancel::CancellationToken;
use crate::config::AdapterDefaults;
use crate::hashing::compute_sha256_async;
use crate::identifier::{ModelIdentifier, LATEST};
use crate::manifest::{
    update_with_checksum, Compute, ExecutionFormat, Framework, Manifest, ModelFile,
};
use crate::network::{Downloader, ExistenceProbe, HttpClient, ProbeVerdict, ProgressCallback};
use crate::package::PackageBuilder;
use crate::{AxonError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Used when the files API is unreachable.
const FALLBACK_FILES: &[&str] = &[
    "config.json",
    "pytorch_model.bin",
    "tokenizer.json",
    "tokenizer_config.json",
    "vocab.txt",
    "vocab.json",
];

/// Tokenizer files added to every non-GGUF selection.
const TOKENIZER_FILES: &[&str] = &[
    "tokenizer.json",
    "tokenizer_config.json",
    "vocab.txt",
    "vocab.json",
];

/// GGUF quantisations in order of preference.
const GGUF_PREFERENCES: &[&str] = &["q4_k_m", "q4_k_s", "q4_0", "q5_k_m", "q8_0"];

const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(alias = "modelId")]
    id: String,
    #[serde(default)]
    pipeline_tag: Option<String>,
    #[serde(default)]
    library_name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Hugging Face Hub adapter.
#[derive(Clone)]
pub struct HuggingFaceAdapter {
    base_url: String,
    http: Arc<HttpClient>,
    downloader: Downloader,
    probe: ExistenceProbe,
}

impl std::fmt::Debug for HuggingFaceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceAdapter")
            .field("base_url", &self.base_url)
            .field("has_token", &self.http.has_authorization())
            .finish()
    }
}

impl HuggingFaceAdapter {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpAdapterConfig::new(AdapterDefaults::HUGGINGFACE_BASE))
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn file_url(&self, repo_id: &str, file: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.base_url, repo_id, file)
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/models/{}", self.base_url, repo_id);
        let info: ModelInfo = self.http.get_json(&url).await?;
        Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
    }

    async fn fetch_io(&self, repo_id: &str) -> Option<crate::manifest::Io> {
        let url = self.file_url(repo_id, "config.json");
        let response = self.http.get(&url).await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let bytes = response.bytes().await.ok()?;
        match io_from_config_bytes(&bytes) {
            Ok(io) => Some(io),
            Err(e) => {
                debug!("Ignoring unparseable config.json for {}: {}", repo_id, e);
                None
            }
        }
    }
}

/// Hub repository id: bare `name` for the `hf` namespace, else `namespace/name`.
pub fn repo_id(namespace: &str, name: &str) -> String {
    if namespace.is_empty() || namespace == "hf" || namespace == "huggingface" {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

/// Pick the preferred GGUF quantisation, else the first file.
pub fn select_best_gguf(files: &[String]) -> Option<&String> {
    GGUF_PREFERENCES
        .iter()
        .find_map(|pref| files.iter().find(|f| f.to_lowercase().contains(pref)))
        .or_else(|| files.first())
}

/// Choose the format and file set to download, preferring formats that need
/// no conversion: GGUF (one quantisation), ONNX, safetensors, PyTorch.
///
/// Returns `None` as the format when no weight file is recognised; every
/// listed file is then selected.
pub fn select_files(files: &[String]) -> (Option<ExecutionFormat>, Vec<String>) {
    let mut gguf = Vec::new();
    let mut onnx = Vec::new();
    let mut safetensors = Vec::new();
    let mut pytorch = Vec::new();
    let mut configs = Vec::new();

    for file in files {
        let lower = file.to_lowercase();
        if lower.ends_with(".gguf") {
            gguf.push(file.clone());
        } else if lower.ends_with(".onnx") {
            onnx.push(file.clone());
        } else if lower.ends_with(".safetensors") {
            safetensors.push(file.clone());
        } else if lower.ends_with(".bin") || lower.ends_with(".pt") || lower.ends_with(".pth") {
            pytorch.push(file.clone());
        } else if lower.ends_with(".json") || lower.ends_with(".txt") {
            configs.push(file.clone());
        }
    }

    let (format, mut selected) = if let Some(best) = select_best_gguf(&gguf) {
        (ExecutionFormat::Gguf, vec![best.clone()])
    } else if !onnx.is_empty() {
        (ExecutionFormat::Onnx, onnx)
    } else if !safetensors.is_empty() {
        (ExecutionFormat::Safetensors, safetensors)
    } else if !pytorch.is_empty() {
        (ExecutionFormat::Pytorch, pytorch)
    } else {
        return (None, files.to_vec());
    };
    selected.extend(configs);

    if format != ExecutionFormat::Gguf {
        for tokenizer in TOKENIZER_FILES {
            if !selected.iter().any(|f| f == tokenizer) {
                selected.push(tokenizer.to_string());
            }
        }
    }
    (Some(format), selected)
}

#[async_trait]
impl RepositoryAdapter for HuggingFaceAdapter {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn can_handle(&self, _namespace: &str, _name: &str) -> bool {
        true
    }

    async fn describe(&self, id: &ModelIdentifier, cancel: &CancellationToken) -> Result<Manifest> {
        let repo_id = repo_id(id.namespace(), id.name());
        let model_url = format!("{}/{}", self.base_url, repo_id);

        match self.probe.probe(&model_url, cancel).await {
            Ok(ProbeVerdict::Absent) => {
                return Err(AxonError::RemoteNotFound {
                    model: id.to_string(),
                })
            }
            Ok(verdict) => debug!("Probe for {}: {:?}", repo_id, verdict),
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Err(e) => warn!("Existence probe for {} inconclusive: {}", repo_id, e),
        }

        let io = cancel
            .run(async { Ok::<_, AxonError>(self.fetch_io(&repo_id).await) })
            .await?
            .unwrap_or_else(generic_io);

        let mut manifest = Manifest::for_identifier(id);
        manifest.metadata.description = format!("Model from Hugging Face: {}", repo_id);
        manifest.metadata.license = "Unknown".to_string();
        manifest.metadata.homepage = Some(model_url);
        manifest.spec.framework = Framework {
            name: "PyTorch".to_string(),
            version: "2.0.0".to_string(),
        };
        manifest.spec.format.format_type = ExecutionFormat::Pytorch.as_str().to_string();
        manifest.spec.format.files = vec![ModelFile::pending("pytorch_model.bin")];
        manifest.spec.io = io;
        manifest.spec.requirements.compute = Compute::baseline();
        manifest.distribution.package.url = self.file_url(&repo_id, "pytorch_model.bin");
        manifest.distribution.registry.url = self.base_url.clone();
        manifest.distribution.registry.namespace = "huggingface".to_string();
        Ok(manifest)
    }

    async fn materialize(
        &self,
        manifest: &mut Manifest,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let repo_id = repo_id(&manifest.metadata.namespace, &manifest.metadata.name);

        let listed = match cancel.run(self.list_files(&repo_id)).await {
            Ok(files) if !files.is_empty() => files,
            Err(AxonError::Cancelled) => return Err(AxonError::Cancelled),
            Ok(_) | Err(_) => {
                debug!("Files API unavailable for {}, using fallback list", repo_id);
                FALLBACK_FILES.iter().map(|f| f.to_string()).collect()
            }
        };

        let (format, files) = select_files(&listed);
        if let Some(format) = format.filter(|f| *f != ExecutionFormat::Pytorch) {
            info!("Detected {} format for {}", format, repo_id);
            manifest.spec.format.format_type = format.as_str().to_string();
            manifest.spec.format.execution_format = Some(format.as_str().to_string());
        }

        let requests: Vec<(String, String)> = files
            .iter()
            .map(|f| (f.clone(), self.file_url(&repo_id, f)))
            .collect();

        let mut builder = PackageBuilder::new()?;
        let fetched = fetch_available(
            &self.downloader,
            &mut builder,
            &repo_id,
            &requests,
            progress,
            cancel,
        )
        .await?;

        let mut model_files = Vec::with_capacity(fetched.len());
        for relative in &fetched {
            let digest = compute_sha256_async(builder.staging_dir().join(relative)).await?;
            model_files.push(ModelFile {
                path: relative.clone(),
                size: digest.size,
                sha256: digest.sha256,
            });
        }
        manifest.spec.format.files = model_files;

        builder.build(destination)?;
        update_with_checksum(manifest, destination)?;
        info!(
            "Packaged {} files for {} ({} bytes)",
            fetched.len(),
            repo_id,
            manifest.distribution.package.size
        );
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/api/models?search={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            SEARCH_LIMIT
        );
        let hits: Vec<SearchHit> = self.http.get_json(&url).await?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                namespace: "hf".to_string(),
                name: hit.id,
                version: LATEST.to_string(),
                description: hit.pipeline_tag.unwrap_or_default(),
                framework: hit.library_name,
                tags: hit.tags,
            })
            .collect())
    }
}
