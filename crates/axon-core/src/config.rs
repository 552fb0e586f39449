//! Centralized configuration for Axon.
//!
//! Compile-time constants live on unit structs grouped by concern. Runtime
//! settings (`AxonConfig`) are loaded from `~/.axon/config.yaml` with
//! environment overrides applied on top.

use crate::atomic::atomic_write_yaml;
use crate::error::{AxonError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
    pub const USER_AGENT: &'static str = "Axon-CLI/1.0";
    pub const MAX_RETRIES: u32 = 3;
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
}

/// Existence-probe parameters.
pub struct ProbeConfig;

impl ProbeConfig {
    pub const RANGE_BYTES: u64 = 1024;
    pub const BODY_SNIFF_BYTES: usize = 2048;
    pub const MAX_REDIRECTS: usize = 10;
    pub const TIMEOUT: Duration = Duration::from_secs(30);
}

/// Cache layout names.
pub struct CacheConfig;

impl CacheConfig {
    pub const MODELS_DIR_NAME: &'static str = "models";
    pub const LOCKS_DIR_NAME: &'static str = "locks";
    pub const STAGING_DIR_NAME: &'static str = ".staging";
    pub const MANIFEST_FILENAME: &'static str = "manifest.yaml";
    pub const METADATA_FILENAME: &'static str = ".axon_metadata.json";
    pub const PACKAGE_EXTENSION: &'static str = "axon";
}

/// Conversion parameters.
pub struct ConversionConfig;

impl ConversionConfig {
    pub const DEFAULT_CONVERTER_IMAGE: &'static str =
        "ghcr.io/mlos-foundation/axon-converter:latest";
    pub const CONVERTER_IMAGE_ENV: &'static str = "AXON_CONVERTER_IMAGE";
    pub const CONTAINER_RUNTIME: &'static str = "docker";
    pub const CONTAINER_MOUNT: &'static str = "/axon/cache";
    pub const CONTAINER_SCRIPTS_DIR: &'static str = "/axon/scripts";
    pub const LOCAL_INTERPRETER: &'static str = "python3";
    pub const ONNX_FILENAME: &'static str = "model.onnx";
    pub const ONNX_SUBDIR: &'static str = "onnx";
    pub const DESCRIPTOR_FILENAME: &'static str = "onnx_manifest.json";
    /// Files smaller than this are treated as truncated exports.
    pub const MIN_ARTIFACT_BYTES: u64 = 1024;
    pub const HEADER_PROBE_BYTES: usize = 16;

    /// Container image, honouring the `AXON_CONVERTER_IMAGE` override.
    pub fn converter_image() -> String {
        std::env::var(Self::CONVERTER_IMAGE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_CONVERTER_IMAGE.to_string())
    }
}

/// Well-known remote endpoints used by the built-in adapters.
pub struct AdapterDefaults;

impl AdapterDefaults {
    pub const HUGGINGFACE_BASE: &'static str = "https://huggingface.co";
    pub const MODELSCOPE_BASE: &'static str = "https://www.modelscope.cn";
    pub const TFHUB_BASE: &'static str = "https://tfhub.dev";
    pub const GITHUB_BASE: &'static str = "https://github.com";
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_RAW_BASE: &'static str = "https://raw.githubusercontent.com";
    pub const PYTORCH_HUB_BASE: &'static str = "https://pytorch.org/hub";
    pub const REPLICATE_API_BASE: &'static str = "https://api.replicate.com";
    pub const REPLICATE_WEB_BASE: &'static str = "https://replicate.com";
}

/// Environment variable names consulted by [`AxonConfig::apply_env_overrides`].
pub struct EnvVars;

impl EnvVars {
    pub const CACHE_DIR: &'static str = "AXON_CACHE_DIR";
    pub const HF_TOKEN: &'static str = "HF_TOKEN";
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Base URL of a generic Axon registry. Empty disables the local adapter.
    pub url: String,
    pub mirrors: Vec<String>,
    pub enable_huggingface: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub huggingface_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            mirrors: Vec::new(),
            enable_huggingface: true,
            huggingface_token: None,
            timeout: NetworkConfig::REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// Download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub max_retries: u32,
    pub verify_checksums: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_retries: NetworkConfig::MAX_RETRIES,
            verify_checksums: true,
        }
    }
}

/// Runtime configuration persisted as YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxonConfig {
    pub home_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub registry: RegistrySettings,
    pub download: DownloadSettings,
    pub log_level: String,
}

impl Default for AxonConfig {
    fn default() -> Self {
        let home_dir = default_home_dir();
        Self {
            cache_dir: home_dir.join("cache"),
            home_dir,
            registry: RegistrySettings::default(),
            download: DownloadSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AxonConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        default_home_dir().join("config.yaml")
    }

    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).with_path(path)?;
        serde_yaml::from_str(&data).map_err(|e| AxonError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Persist to `path` atomically.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        atomic_write_yaml(path, self)
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(EnvVars::CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(token) = lookup(EnvVars::HF_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.registry.huggingface_token = Some(token);
        }
    }

    /// Registry timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.timeout.max(1))
    }
}

fn default_home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".axon")
}
