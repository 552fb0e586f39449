//! Local model cache.
//!
//! Layout: `<root>/models/<namespace>/<name segments>/<version>/` holding
//! `manifest.yaml`, `.axon_metadata.json` and the package archive.
//!
//! Installs are staged under `<root>/.staging/<uuid>/` and published with a
//! single directory rename, so a model directory either exists complete or
//! not at all. Installs of the same identifier are serialised with an
//! advisory lock on `<root>/locks/<namespace>/<name>/<version>.lock`.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::config::CacheConfig;
use crate::error::{AxonError, IoResultExt, Result};
use crate::hashing::{compute_sha256, digests_match, FileDigest};
use crate::identifier::ModelIdentifier;
use crate::manifest::{self, Manifest};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Sidecar written next to every cached manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallMetadata {
    pub installed_at: DateTime<Utc>,
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl InstallMetadata {
    pub fn identifier(&self) -> ModelIdentifier {
        ModelIdentifier::new(
            self.namespace.clone(),
            self.name.clone(),
            self.version.clone(),
        )
    }
}

/// A model found in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedModel {
    pub identifier: ModelIdentifier,
    pub path: PathBuf,
    pub installed_at: DateTime<Utc>,
}

/// Directory-backed model cache.
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(CacheConfig::MODELS_DIR_NAME)
    }

    /// Directory for `id`; each `/` in the name becomes a directory level.
    pub fn path_for(&self, id: &ModelIdentifier) -> PathBuf {
        let mut path = self.models_dir().join(id.namespace());
        for segment in id.name().split('/') {
            path.push(segment);
        }
        path.join(id.version())
    }

    /// `<ns>-<name>-<version>.axon`, with `/` in the name flattened to `-`.
    pub fn package_file_name(id: &ModelIdentifier) -> String {
        format!(
            "{}-{}-{}.{}",
            id.namespace(),
            id.name().replace('/', "-"),
            id.version(),
            CacheConfig::PACKAGE_EXTENSION
        )
    }

    pub fn package_path(&self, id: &ModelIdentifier) -> PathBuf {
        self.path_for(id).join(Self::package_file_name(id))
    }

    pub fn manifest_path(&self, id: &ModelIdentifier) -> PathBuf {
        self.path_for(id).join(CacheConfig::MANIFEST_FILENAME)
    }

    /// Whether a fully installed copy of `id` exists.
    pub fn is_present(&self, id: &ModelIdentifier) -> bool {
        let dir = self.path_for(id);
        dir.join(CacheConfig::MANIFEST_FILENAME).is_file()
            && dir.join(CacheConfig::METADATA_FILENAME).is_file()
    }

    /// Install `manifest` and move `package` into the cache.
    ///
    /// Returns the model directory. If another installer published the same
    /// identifier while this one waited for the lock, the existing directory
    /// is returned and `package` is left untouched.
    pub fn install(&self, manifest: &Manifest, package: &Path) -> Result<PathBuf> {
        let id = manifest.identifier();
        let staged = self.stage(manifest)?;
        if self.is_present(&id) {
            info!("{} was installed concurrently, keeping existing copy", id);
            return Ok(self.path_for(&id));
        }
        staged.commit(package)
    }

    /// Phase one of an install: take the lock and write the manifest and
    /// sidecar into a private staging directory.
    ///
    /// Nothing is visible to [`is_present`](Self::is_present) until
    /// [`StagedInstall::commit`] publishes the directory. Dropping the
    /// returned value discards the staging directory.
    pub fn stage(&self, manifest: &Manifest) -> Result<StagedInstall> {
        let id = manifest.identifier();
        let lock = self.lock(&id)?;

        let staging_root = self.root.join(CacheConfig::STAGING_DIR_NAME);
        fs::create_dir_all(&staging_root).with_path(&staging_root)?;
        let staging_dir = staging_root.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir(&staging_dir).with_path(&staging_dir)?;

        let staged = StagedInstall {
            id: id.clone(),
            staging_dir,
            final_dir: self.path_for(&id),
            package_name: Self::package_file_name(&id),
            committed: false,
            _lock: lock,
        };

        manifest::write_file(
            manifest,
            &staged.staging_dir.join(CacheConfig::MANIFEST_FILENAME),
        )?;
        let metadata = InstallMetadata {
            installed_at: Utc::now(),
            namespace: id.namespace().to_string(),
            name: id.name().to_string(),
            version: id.version().to_string(),
        };
        atomic_write_json(
            &staged.staging_dir.join(CacheConfig::METADATA_FILENAME),
            &metadata,
        )?;
        debug!("Staged {} in {}", id, staged.staging_dir.display());
        Ok(staged)
    }

    /// Remove `id` from the cache. Returns `false` when it was not present.
    pub fn remove(&self, id: &ModelIdentifier) -> Result<bool> {
        let _lock = self.lock(id)?;
        let dir = self.path_for(id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| AxonError::io("removing cached model", &dir, e))?;
        self.prune_empty_parents(&dir);
        info!("Removed {} from cache", id);
        Ok(true)
    }

    /// Every installed model, found by walking for metadata sidecars.
    pub fn list(&self) -> Result<Vec<CachedModel>> {
        let models_dir = self.models_dir();
        if !models_dir.exists() {
            return Ok(Vec::new());
        }

        let mut models = Vec::new();
        for entry in WalkDir::new(&models_dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_name() != CacheConfig::METADATA_FILENAME {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            match atomic_read_json::<InstallMetadata>(entry.path()) {
                Ok(Some(meta)) => models.push(CachedModel {
                    identifier: meta.identifier(),
                    path: dir.to_path_buf(),
                    installed_at: meta.installed_at,
                }),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable metadata {}: {}", entry.path().display(), e),
            }
        }
        models.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(models)
    }

    /// Total bytes under the model directory.
    pub fn size(&self, id: &ModelIdentifier) -> Result<u64> {
        let dir = self.path_for(id);
        if !dir.exists() {
            return Err(AxonError::RemoteNotFound {
                model: format!("{} (not in cache)", id),
            });
        }
        Ok(WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum())
    }

    pub fn load_manifest(&self, id: &ModelIdentifier) -> Result<Manifest> {
        manifest::parse_file(&self.manifest_path(id))
    }

    /// Persist an updated manifest for an installed model.
    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        manifest::write_file(manifest, &self.manifest_path(&manifest.identifier()))
    }

    /// Re-hash the cached archive against the manifest digest.
    pub fn verify(&self, id: &ModelIdentifier) -> Result<FileDigest> {
        let manifest = self.load_manifest(id)?;
        let expected = manifest.distribution.package.sha256.trim();
        if expected.is_empty() {
            return Err(AxonError::Validation {
                field: "distribution.package.sha256".to_string(),
                message: format!("no digest recorded for {}", id),
            });
        }

        let digest = compute_sha256(self.package_path(id))?;
        if !digests_match(expected, &digest.sha256) {
            return Err(AxonError::ChecksumMismatch {
                expected: expected.to_lowercase(),
                actual: digest.sha256,
            });
        }
        Ok(digest)
    }

    fn lock(&self, id: &ModelIdentifier) -> Result<InstallLock> {
        id.ensure_path_safe()?;
        let mut path = self
            .root
            .join(CacheConfig::LOCKS_DIR_NAME)
            .join(id.namespace());
        for segment in id.name().split('/') {
            path.push(segment);
        }
        let path = path.join(format!("{}.lock", id.version()));
        InstallLock::acquire(&path)
    }

    fn prune_empty_parents(&self, dir: &Path) {
        let models_dir = self.models_dir();
        let mut current = dir.parent();
        while let Some(parent) = current {
            if parent == models_dir || !parent.starts_with(&models_dir) {
                break;
            }
            if fs::remove_dir(parent).is_err() {
                break;
            }
            current = parent.parent();
        }
    }
}

/// Exclusive advisory lock held for the duration of an install.
#[derive(Debug)]
struct InstallLock {
    file: File,
}

impl InstallLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_path(path)?;
        file.lock_exclusive()
            .map_err(|e| AxonError::io("acquiring install lock", path, e))?;
        Ok(Self { file })
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// A staged install holding the identifier's lock.
#[derive(Debug)]
pub struct StagedInstall {
    id: ModelIdentifier,
    staging_dir: PathBuf,
    final_dir: PathBuf,
    package_name: String,
    committed: bool,
    _lock: InstallLock,
}

impl StagedInstall {
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Phase two: move the package in and publish the directory.
    pub fn commit(mut self, package: &Path) -> Result<PathBuf> {
        move_file(package, &self.staging_dir.join(&self.package_name))?;

        if let Some(parent) = self.final_dir.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        if self.final_dir.exists() {
            // Leftover from an install that died before publishing metadata.
            warn!("Replacing incomplete cache entry {}", self.final_dir.display());
            fs::remove_dir_all(&self.final_dir)
                .map_err(|e| AxonError::io("removing incomplete entry", &self.final_dir, e))?;
        }
        fs::rename(&self.staging_dir, &self.final_dir)
            .map_err(|e| AxonError::io("publishing cache entry", &self.final_dir, e))?;
        self.committed = true;

        info!("Installed {} at {}", self.id, self.final_dir.display());
        Ok(self.final_dir.clone())
    }
}

impl Drop for StagedInstall {
    fn drop(&mut self) {
        if !self.committed && self.staging_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging_dir) {
                warn!(
                    "Failed to clean staging dir {}: {}",
                    self.staging_dir.display(),
                    e
                );
            }
        }
    }
}

/// Rename, falling back to copy-then-delete across filesystems.
pub fn move_file(source: &Path, destination: &Path) -> Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                "Rename {} -> {} failed ({}), copying",
                source.display(),
                destination.display(),
                rename_err
            );
            fs::copy(source, destination).map_err(|e| {
                let _ = fs::remove_file(destination);
                AxonError::io("copying package", source, e)
            })?;
            fs::remove_file(source).map_err(|e| AxonError::io("removing source package", source, e))
        }
    }
}
