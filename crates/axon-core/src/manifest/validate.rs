//! Field-by-field manifest validation.
//!
//! The pipeline only enforces [`validate_file_paths`] on manifests it fetches;
//! the full [`validate`] is for registries and publishers, and callers surface
//! the returned error as-is.

use super::types::{Manifest, API_VERSION, KIND_MODEL};
use crate::error::{AxonError, Result};
use regex::Regex;
use std::sync::LazyLock;

const KNOWN_FRAMEWORKS: &[&str] = &[
    "pytorch",
    "tensorflow",
    "onnx",
    "jax",
    "scikit-learn",
    "keras",
    "tflite",
];

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("slug regex must compile"));

static SHA256_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{64}$").expect("sha256 regex must compile"));

fn fail(field: impl Into<String>, message: impl Into<String>) -> AxonError {
    AxonError::Validation {
        field: field.into(),
        message: message.into(),
    }
}

/// Whether `path` is relative and free of `..` segments.
pub fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.starts_with('\\')
        && !path.contains(':')
        && !path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Reject any declared file path that is absolute or climbs out of the model
/// directory.
pub fn validate_file_paths(m: &Manifest) -> Result<()> {
    for (i, file) in m.spec.format.files.iter().enumerate() {
        if !is_safe_relative_path(&file.path) {
            return Err(fail(
                format!("spec.format.files[{}].path", i),
                format!("must be a relative path without '..': {}", file.path),
            ));
        }
    }
    Ok(())
}

/// Validate a manifest, returning the first failing field.
pub fn validate(m: &Manifest) -> Result<()> {
    if m.api_version.is_empty() {
        return Err(fail("apiVersion", "is required"));
    }
    if m.api_version != API_VERSION {
        return Err(fail(
            "apiVersion",
            format!("unsupported {} (expected {})", m.api_version, API_VERSION),
        ));
    }
    if m.kind != KIND_MODEL {
        return Err(fail("kind", format!("unsupported '{}' (expected Model)", m.kind)));
    }

    let meta = &m.metadata;
    if !SLUG_RE.is_match(&meta.name) {
        return Err(fail("metadata.name", "must be lowercase alphanumeric with hyphens"));
    }
    if !SLUG_RE.is_match(&meta.namespace) {
        return Err(fail(
            "metadata.namespace",
            "must be lowercase alphanumeric with hyphens",
        ));
    }
    if let Err(e) = semver::Version::parse(meta.version.trim_start_matches('v')) {
        return Err(fail("metadata.version", format!("must be valid semver: {}", e)));
    }
    if meta.description.is_empty() {
        return Err(fail("metadata.description", "is required"));
    }
    if meta.license.is_empty() {
        return Err(fail("metadata.license", "is required"));
    }

    let spec = &m.spec;
    if !KNOWN_FRAMEWORKS.contains(&spec.framework.name.to_lowercase().as_str()) {
        return Err(fail(
            "spec.framework.name",
            format!("unsupported framework '{}'", spec.framework.name),
        ));
    }
    if spec.framework.version.is_empty() {
        return Err(fail("spec.framework.version", "is required"));
    }
    if spec.format.format_type.is_empty() {
        return Err(fail("spec.format.type", "is required"));
    }
    if spec.format.files.is_empty() {
        return Err(fail("spec.format.files", "cannot be empty"));
    }
    validate_file_paths(m)?;
    for (i, file) in spec.format.files.iter().enumerate() {
        let field = format!("spec.format.files[{}]", i);
        if file.size == 0 {
            return Err(fail(format!("{}.size", field), "must be positive"));
        }
        if !SHA256_RE.is_match(&file.sha256.to_lowercase()) {
            return Err(fail(format!("{}.sha256", field), "must be a SHA256 hex string"));
        }
    }
    if spec.io.inputs.is_empty() {
        return Err(fail("spec.io.inputs", "cannot be empty"));
    }
    if spec.io.outputs.is_empty() {
        return Err(fail("spec.io.outputs", "cannot be empty"));
    }
    if spec.requirements.compute.cpu.min_cores == 0 {
        return Err(fail("spec.requirements.compute.cpu.min_cores", "must be positive"));
    }
    if spec.requirements.compute.memory.min_gb <= 0.0 {
        return Err(fail("spec.requirements.compute.memory.min_gb", "must be positive"));
    }

    let dist = &m.distribution;
    if dist.package.url.is_empty() {
        return Err(fail("distribution.package.url", "is required"));
    }
    if dist.package.size == 0 {
        return Err(fail("distribution.package.size", "must be positive"));
    }
    if !SHA256_RE.is_match(&dist.package.sha256.to_lowercase()) {
        return Err(fail("distribution.package.sha256", "must be a SHA256 hex string"));
    }
    if dist.registry.url.is_empty() {
        return Err(fail("distribution.registry.url", "is required"));
    }
    if dist.registry.namespace.is_empty() {
        return Err(fail("distribution.registry.namespace", "is required"));
    }

    Ok(())
}
