//! End-to-end install pipeline.
//!
//! resolve adapter → describe → materialize into a scratch file → install
//! into the cache → unpack and convert when the model is not execution-ready
//! → classify. Every step runs sequentially for one identifier.

use crate::adapters::AdapterRegistry;
use crate::cache::CacheManager;
use crate::cancel::CancellationToken;
use crate::config::{AxonConfig, CacheConfig};
use crate::conversion::{ConversionOutcome, ConversionRequest, Converter};
use crate::error::{AxonError, IoResultExt, Result};
use crate::identifier::ModelIdentifier;
use crate::manifest::{apply_execution_format, is_execution_ready, Manifest};
use crate::network::ProgressCallback;
use crate::package;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What an install did.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallReport {
    pub identifier: ModelIdentifier,
    /// Adapter that produced the package; `cache` when already installed.
    pub adapter: String,
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
    /// `None` when conversion was not attempted in this run.
    pub conversion: Option<ConversionOutcome>,
    pub already_installed: bool,
}

/// Runs installs against one registry and cache.
#[derive(Debug, Clone)]
pub struct Installer {
    registry: AdapterRegistry,
    cache: CacheManager,
    converter: Option<Converter>,
}

impl Installer {
    pub fn new(registry: AdapterRegistry, cache: CacheManager, converter: Option<Converter>) -> Self {
        Self {
            registry,
            cache,
            converter,
        }
    }

    /// Default adapters, cache at `config.cache_dir`, conversion enabled.
    pub fn from_config(config: &AxonConfig) -> Result<Self> {
        Ok(Self::new(
            AdapterRegistry::with_defaults(config)?,
            CacheManager::new(config.cache_dir.clone()),
            Some(Converter::new()?),
        ))
    }

    pub fn without_conversion(mut self) -> Self {
        self.converter = None;
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Install `id`, returning early if it is already cached.
    ///
    /// A conversion failure is returned as an error, but the downloaded
    /// model stays installed and can be converted later with
    /// [`convert_cached`](Self::convert_cached).
    pub async fn install(
        &self,
        id: &ModelIdentifier,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<InstallReport> {
        if self.cache.is_present(id) {
            info!("{} is already installed", id);
            let manifest = self.cache.load_manifest(id)?;
            return Ok(InstallReport {
                identifier: id.clone(),
                adapter: "cache".to_string(),
                path: self.cache.path_for(id),
                sha256: manifest.distribution.package.sha256,
                size: manifest.distribution.package.size,
                conversion: None,
                already_installed: true,
            });
        }

        let adapter = self.registry.resolve(id.namespace(), id.name())?;
        info!("Resolved {} to adapter {}", id, adapter.name());

        let mut manifest = adapter.describe(id, cancel).await?;
        align_identity(&mut manifest, id);

        let staging_root = self.cache.root().join(CacheConfig::STAGING_DIR_NAME);
        tokio::fs::create_dir_all(&staging_root)
            .await
            .with_path(&staging_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("axon-download-")
            .tempdir_in(&staging_root)
            .with_path(&staging_root)?;
        let package_path = scratch.path().join(CacheManager::package_file_name(id));

        adapter
            .materialize(&mut manifest, &package_path, progress, cancel)
            .await?;
        cancel.check()?;

        let path = {
            let cache = self.cache.clone();
            let manifest = manifest.clone();
            let package_path = package_path.clone();
            blocking(move || cache.install(&manifest, &package_path)).await?
        };
        drop(scratch);

        let conversion = match &self.converter {
            Some(converter) => Some(self.convert_installed(converter, &mut manifest, &path, cancel).await?),
            None => None,
        };

        Ok(InstallReport {
            identifier: id.clone(),
            adapter: adapter.name().to_string(),
            path,
            sha256: manifest.distribution.package.sha256,
            size: manifest.distribution.package.size,
            conversion,
            already_installed: false,
        })
    }

    /// Run conversion for a model that is already in the cache.
    pub async fn convert_cached(
        &self,
        id: &ModelIdentifier,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome> {
        if !self.cache.is_present(id) {
            return Err(AxonError::RemoteNotFound {
                model: format!("{} (not in cache)", id),
            });
        }
        let converter = match &self.converter {
            Some(converter) => converter.clone(),
            None => Converter::new()?,
        };
        let mut manifest = self.cache.load_manifest(id)?;
        let path = self.cache.path_for(id);
        self.convert_installed(&converter, &mut manifest, &path, cancel)
            .await
    }

    async fn convert_installed(
        &self,
        converter: &Converter,
        manifest: &mut Manifest,
        model_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutcome> {
        if manifest.execution_format().map(is_execution_ready).unwrap_or(false) {
            return Ok(ConversionOutcome::NotNeeded);
        }

        let archive = self.cache.package_path(&manifest.identifier());
        let dir = model_dir.to_path_buf();
        let files = blocking(move || package::unpack(&archive, &dir)).await?;
        debug!("Unpacked {} file(s) into {}", files.len(), model_dir.display());

        let detected = apply_execution_format(manifest, model_dir)?;
        let request = ConversionRequest {
            model_dir: model_dir.to_path_buf(),
            framework: manifest.spec.framework.name.clone(),
            namespace: manifest.metadata.namespace.clone(),
            model_id: manifest.metadata.name.clone(),
            execution_format: Some(detected.as_str().to_string()),
        };

        let outcome = match converter.convert(&request, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Conversion of {} failed; the original artifact stays installed at {}",
                    manifest.full_version(),
                    model_dir.display()
                );
                self.cache.save_manifest(manifest)?;
                return Err(e);
            }
        };

        match &outcome {
            ConversionOutcome::Converted { result, .. } => {
                manifest.spec.format.execution_format = Some("onnx".to_string());
                manifest.spec.format.multi_encoder = self
                    .descriptor_type(model_dir, result.is_multi_component);
            }
            ConversionOutcome::Skipped { reason } => {
                warn!("ONNX conversion skipped for {}: {}", manifest.full_version(), reason);
            }
            ConversionOutcome::NotNeeded => {}
        }
        self.cache.save_manifest(manifest)?;
        Ok(outcome)
    }

    fn descriptor_type(&self, model_dir: &Path, multi: bool) -> Option<String> {
        if !multi {
            return None;
        }
        crate::conversion::read_descriptor(model_dir)
            .ok()
            .flatten()
            .map(|d| d.component_type)
    }
}

/// Key the manifest on the identifier the caller asked for.
fn align_identity(manifest: &mut Manifest, id: &ModelIdentifier) {
    if manifest.identifier() != *id {
        debug!(
            "Adapter described {} for requested {}",
            manifest.full_version(),
            id
        );
        manifest.metadata.namespace = id.namespace().to_string();
        manifest.metadata.name = id.name().to_string();
        manifest.metadata.version = id.version().to_string();
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AxonError::Other(format!("Blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{RepositoryAdapter, SearchResult};
    use crate::manifest::{update_with_checksum, ModelFile};
    use crate::package::PackageBuilder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Packages a single GGUF file without touching the network.
    struct StaticAdapter {
        materialized: AtomicUsize,
    }

    #[async_trait]
    impl RepositoryAdapter for StaticAdapter {
        fn name(&self) -> &str {
            "static"
        }

        fn can_handle(&self, namespace: &str, _name: &str) -> bool {
            namespace == "test"
        }

        async fn describe(&self, id: &ModelIdentifier, _: &CancellationToken) -> Result<Manifest> {
            let mut manifest = Manifest::for_identifier(id);
            manifest.spec.format.format_type = "pytorch".into();
            manifest.spec.format.files = vec![ModelFile::pending("tiny-q4_0.gguf")];
            Ok(manifest)
        }

        async fn materialize(
            &self,
            manifest: &mut Manifest,
            destination: &Path,
            _: Option<&ProgressCallback>,
            _: &CancellationToken,
        ) -> Result<()> {
            self.materialized.fetch_add(1, Ordering::SeqCst);
            let mut builder = PackageBuilder::new()?;
            builder.add_bytes("tiny-q4_0.gguf", b"GGUF\x03\x00\x00\x00")?;
            builder.build(destination)?;
            update_with_checksum(manifest, destination)
        }

        async fn search(&self, _: &str) -> Result<Vec<SearchResult>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_install_then_short_circuit() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = Arc::new(StaticAdapter {
            materialized: AtomicUsize::new(0),
        });
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        let installer = Installer::new(
            registry,
            CacheManager::new(temp_dir.path().join("cache")),
            Some(Converter::new().unwrap()),
        );
        let id = ModelIdentifier::parse("test/tiny").unwrap();
        let cancel = CancellationToken::new();

        let report = installer.install(&id, None, &cancel).await.unwrap();
        assert_eq!(report.adapter, "static");
        assert!(!report.already_installed);
        assert_eq!(report.conversion, Some(ConversionOutcome::NotNeeded));
        assert!(report.path.join("tiny-q4_0.gguf").exists());
        assert_eq!(installer.cache().verify(&id).unwrap().sha256, report.sha256);

        let cached = installer.cache().load_manifest(&id).unwrap();
        assert_eq!(cached.execution_format(), Some("gguf"));
        assert_eq!(cached.spec.format.format_type, "gguf");

        let again = installer.install(&id, None, &cancel).await.unwrap();
        assert!(again.already_installed);
        assert_eq!(again.sha256, report.sha256);
        assert_eq!(adapter.materialized.load(Ordering::SeqCst), 1);

        let staging = temp_dir.path().join("cache").join(CacheConfig::STAGING_DIR_NAME);
        assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let installer = Installer::new(
            AdapterRegistry::new(),
            CacheManager::new(temp_dir.path()),
            None,
        );
        let id = ModelIdentifier::parse("nowhere/model").unwrap();
        let result = installer.install(&id, None, &CancellationToken::new()).await;
        assert!(matches!(result, Err(AxonError::AdapterNotFound { .. })));
    }
}
