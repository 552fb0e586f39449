//! Manifest document types.
//!
//! Field names mirror the YAML layout consumed by registries and written to
//! the cache (`apiVersion`, `metadata`, `spec`, `distribution`).

use crate::identifier::ModelIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version written into every manifest produced locally.
pub const API_VERSION: &str = "axon.mlos.io/v1";
/// The only supported manifest kind.
pub const KIND_MODEL: &str = "Model";

/// Description of one model version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: Spec,
    pub distribution: Distribution,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub namespace: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Spec {
    pub framework: Framework,
    pub format: Format,
    #[serde(default)]
    pub io: Io,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default, skip_serializing_if = "Performance::is_empty")]
    pub performance: Performance,
    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub dependencies: Dependencies,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Framework {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Format {
    /// Declared source format (`pytorch`, `saved_model`, `gguf`, ...).
    #[serde(rename = "type")]
    pub format_type: String,
    /// Terminal runnable format once known.
    #[serde(
        rename = "executionFormat",
        alias = "execution_format",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub execution_format: Option<String>,
    /// Multi-encoder family (`clip`, `seq2seq`) when the export has several towers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_encoder: Option<String>,
    #[serde(default)]
    pub files: Vec<ModelFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelFile {
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sha256: String,
}

impl ModelFile {
    /// A file entry whose size and digest are filled in after download.
    pub fn pending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            sha256: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Io {
    #[serde(default)]
    pub inputs: Vec<TensorSpec>,
    #[serde(default)]
    pub outputs: Vec<TensorSpec>,
}

/// A named tensor. `-1` in `shape` marks a dynamic dimension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: String,
    #[serde(default)]
    pub shape: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessing: Option<Preprocessing>,
}

impl TensorSpec {
    pub fn new(name: &str, dtype: &str, shape: &[i64]) -> Self {
        Self {
            name: name.to_string(),
            dtype: dtype.to_string(),
            shape: shape.to_vec(),
            description: None,
            preprocessing: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_preprocessing(mut self, preprocessing: Preprocessing) -> Self {
        self.preprocessing = Some(preprocessing);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preprocessing {
    /// `tokenization`, `normalization`, `resize`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub compute: Compute,
    #[serde(default)]
    pub storage: Storage,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Compute {
    #[serde(default)]
    pub cpu: CpuRequirement,
    #[serde(default)]
    pub memory: MemoryRequirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuRequirement>,
}

impl Compute {
    /// The modest CPU-only baseline used when a source publishes no hints.
    pub fn baseline() -> Self {
        Self {
            cpu: CpuRequirement {
                min_cores: 2,
                recommended_cores: 4,
            },
            memory: MemoryRequirement {
                min_gb: 2.0,
                recommended_gb: 4.0,
            },
            gpu: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuRequirement {
    pub min_cores: u32,
    pub recommended_cores: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryRequirement {
    pub min_gb: f64,
    pub recommended_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GpuRequirement {
    pub required: bool,
    pub recommended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_vram_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuda_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Storage {
    #[serde(default)]
    pub min_gb: f64,
    #[serde(default)]
    pub recommended_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Performance {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inference_time: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub throughput: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub accuracy: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

impl Performance {
    pub fn is_empty(&self) -> bool {
        self.inference_time.is_empty()
            && self.throughput.is_empty()
            && self.accuracy.is_empty()
            && self.dataset.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageDependency>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.packages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageDependency {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub package: PackageInfo,
    #[serde(default)]
    pub registry: RegistryInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryInfo {
    pub url: String,
    pub namespace: String,
}

impl Manifest {
    /// Start a manifest for `id` with the current time as created/updated.
    pub fn for_identifier(id: &ModelIdentifier) -> Self {
        let now = Utc::now();
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND_MODEL.to_string(),
            metadata: Metadata {
                name: id.name().to_string(),
                namespace: id.namespace().to_string(),
                version: id.version().to_string(),
                created: now,
                updated: now,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// `namespace/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }

    /// `namespace/name@version`
    pub fn full_version(&self) -> String {
        format!("{}@{}", self.full_name(), self.metadata.version)
    }

    pub fn identifier(&self) -> ModelIdentifier {
        ModelIdentifier::new(
            self.metadata.namespace.clone(),
            self.metadata.name.clone(),
            self.metadata.version.clone(),
        )
    }

    /// Primary package URL followed by mirrors, skipping blanks.
    pub fn package_sources(&self) -> Vec<String> {
        std::iter::once(&self.distribution.package.url)
            .chain(self.distribution.package.mirrors.iter())
            .filter(|u| !u.trim().is_empty())
            .cloned()
            .collect()
    }

    pub fn execution_format(&self) -> Option<&str> {
        self.spec.format.execution_format.as_deref()
    }
}
