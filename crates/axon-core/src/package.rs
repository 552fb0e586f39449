//! Package builder: stages files in a scratch directory and seals them into
//! one gzip-compressed tar archive.
//!
//! The scratch directory is a `tempfile::TempDir`, so it is removed when the
//! builder is dropped, whichever way the caller exits.

use crate::error::{AxonError, IoResultExt, Result};
use crate::hashing::{compute_sha256, FileDigest};
use crate::manifest::is_safe_relative_path;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

/// Scratch directory plus the list of staged relative paths.
#[derive(Debug)]
pub struct PackageBuilder {
    staging: TempDir,
    entries: Vec<String>,
}

impl PackageBuilder {
    pub fn new() -> Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("axon-package-")
            .tempdir()
            .map_err(|e| {
                AxonError::io(
                    "Failed to create package staging directory",
                    std::env::temp_dir(),
                    e,
                )
            })?;
        Ok(Self {
            staging,
            entries: Vec::new(),
        })
    }

    /// Scratch directory that downloads can be written into directly.
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Absolute staging path for `relative`, creating parent directories.
    ///
    /// The entry is recorded, so the caller only has to write the file.
    pub fn reserve(&mut self, relative: &str) -> Result<PathBuf> {
        let relative = check_relative(relative)?;
        let target = self.staging.path().join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        if !self.entries.contains(&relative) {
            self.entries.push(relative);
        }
        Ok(target)
    }

    /// Forget a reserved entry whose download failed.
    pub fn discard(&mut self, relative: &str) {
        self.entries.retain(|e| e != relative);
        let _ = fs::remove_file(self.staging.path().join(relative));
    }

    /// Copy an existing file into the package.
    pub fn add_file(&mut self, source: &Path, relative: &str) -> Result<()> {
        let target = self.reserve(relative)?;
        fs::copy(source, &target).with_path(source)?;
        Ok(())
    }

    /// Add an in-memory document to the package.
    pub fn add_bytes(&mut self, relative: &str, data: &[u8]) -> Result<()> {
        let target = self.reserve(relative)?;
        fs::write(&target, data).with_path(&target)?;
        Ok(())
    }

    /// Staged relative paths, in insertion order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the archive to `destination` and return its digest.
    ///
    /// Entries are written in sorted order so identical inputs give identical
    /// archives. The scratch directory is released when `self` drops.
    pub fn build(self, destination: &Path) -> Result<FileDigest> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
        }

        let mut entries = self.entries.clone();
        entries.sort();

        let file = File::create(destination).with_path(destination)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut archive = tar::Builder::new(encoder);

        for relative in &entries {
            let source = self.staging.path().join(relative);
            archive
                .append_path_with_name(&source, relative)
                .map_err(|e| AxonError::io("Failed to append package entry", &source, e))?;
        }

        let encoder = archive
            .into_inner()
            .map_err(|e| AxonError::io("Failed to finish package archive", destination, e))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| AxonError::io("Failed to finish gzip stream", destination, e))?;
        writer.flush().with_path(destination)?;

        let digest = compute_sha256(destination)?;
        debug!(
            "Built package {} ({} entries, {} bytes)",
            destination.display(),
            entries.len(),
            digest.size
        );
        Ok(digest)
    }
}

/// Unpack a package archive into `dest_dir`.
///
/// Entries that would escape `dest_dir` are rejected by `tar` itself.
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(dest_dir).with_path(dest_dir)?;
    let file = File::open(archive_path).with_path(archive_path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);

    archive.unpack(dest_dir).map_err(|e| AxonError::ArtifactCorrupt {
        path: archive_path.to_path_buf(),
        message: format!("Failed to extract package: {}", e),
    })?;

    let mut files: Vec<String> = WalkDir::new(dest_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(dest_dir)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// List the entry names of a package without extracting it.
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path).with_path(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let corrupt = |e: std::io::Error| AxonError::ArtifactCorrupt {
        path: archive_path.to_path_buf(),
        message: format!("Failed to read package: {}", e),
    };

    let mut names = Vec::new();
    for entry in archive.entries().map_err(corrupt)? {
        let entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?;
        names.push(path.to_string_lossy().to_string());
    }
    Ok(names)
}

/// Read one entry of a package into memory.
pub fn read_entry(archive_path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let file = File::open(archive_path).with_path(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let corrupt = |e: std::io::Error| AxonError::ArtifactCorrupt {
        path: archive_path.to_path_buf(),
        message: format!("Failed to read package: {}", e),
    };

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if entry.path().map_err(corrupt)?.to_string_lossy() == name {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(corrupt)?;
            return Ok(Some(data));
        }
    }
    Ok(None)
}

fn check_relative(relative: &str) -> Result<String> {
    let normalized = relative.replace('\\', "/");
    if !is_safe_relative_path(&normalized) {
        return Err(AxonError::Validation {
            field: "spec.format.files".to_string(),
            message: format!("unsafe package path '{}'", relative),
        });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_and_unpack() {
        let out = TempDir::new().unwrap();
        let archive = out.path().join("model.axon");

        let mut builder = PackageBuilder::new().unwrap();
        builder.add_bytes("config.json", b"{\"model_type\":\"bert\"}").unwrap();
        builder.add_bytes("onnx/model.onnx", &[0x08, 0x07]).unwrap();
        let staging = builder.staging_dir().to_path_buf();
        let digest = builder.build(&archive).unwrap();

        assert!(!staging.exists(), "staging dir must be removed");
        assert_eq!(digest.size, fs::metadata(&archive).unwrap().len());

        let dest = out.path().join("unpacked");
        let files = unpack(&archive, &dest).unwrap();
        assert_eq!(files, vec!["config.json", "onnx/model.onnx"]);
        assert_eq!(
            read_entry(&archive, "config.json").unwrap().unwrap(),
            b"{\"model_type\":\"bert\"}"
        );
    }

    #[test]
    fn test_staging_released_on_drop() {
        let staging = {
            let mut builder = PackageBuilder::new().unwrap();
            builder.add_bytes("a.bin", b"abc").unwrap();
            builder.staging_dir().to_path_buf()
        };
        assert!(!staging.exists());
    }

    #[test]
    fn test_rejects_traversal() {
        let mut builder = PackageBuilder::new().unwrap();
        assert!(builder.add_bytes("../escape", b"x").is_err());
        assert!(builder.add_bytes("/etc/passwd", b"x").is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_discard_removes_entry() {
        let mut builder = PackageBuilder::new().unwrap();
        let path = builder.reserve("weights.bin").unwrap();
        fs::write(&path, b"partial").unwrap();
        builder.discard("weights.bin");
        assert!(builder.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_identical_inputs_identical_listing() {
        let out = TempDir::new().unwrap();
        let archive = out.path().join("p.axon");
        let mut builder = PackageBuilder::new().unwrap();
        builder.add_bytes("b.txt", b"b").unwrap();
        builder.add_bytes("a.txt", b"a").unwrap();
        builder.build(&archive).unwrap();
        assert_eq!(list_entries(&archive).unwrap(), vec!["a.txt", "b.txt"]);
    }
}
