//! Execution-format detection and post-hoc package digests.

use super::types::Manifest;
use crate::error::{IoResultExt, Result};
use crate::hashing::compute_sha256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Runnable model representations recognised by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionFormat {
    Gguf,
    Onnx,
    Safetensors,
    Pytorch,
    Tensorflow,
}

impl ExecutionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionFormat::Gguf => "gguf",
            ExecutionFormat::Onnx => "onnx",
            ExecutionFormat::Safetensors => "safetensors",
            ExecutionFormat::Pytorch => "pytorch",
            ExecutionFormat::Tensorflow => "tensorflow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gguf" => Some(ExecutionFormat::Gguf),
            "onnx" => Some(ExecutionFormat::Onnx),
            "safetensors" => Some(ExecutionFormat::Safetensors),
            "pytorch" | "torch" => Some(ExecutionFormat::Pytorch),
            "tensorflow" | "tf" | "saved_model" => Some(ExecutionFormat::Tensorflow),
            _ => None,
        }
    }

    /// Terminal formats run directly and never need conversion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionFormat::Gguf | ExecutionFormat::Onnx)
    }

    /// Infer from the declared `spec.format.type` when no file gives it away.
    pub fn from_type_hint(format_type: &str) -> Self {
        match format_type.trim().to_lowercase().as_str() {
            "gguf" => ExecutionFormat::Gguf,
            "safetensors" => ExecutionFormat::Safetensors,
            "pytorch" | "torch" => ExecutionFormat::Pytorch,
            "tensorflow" | "saved_model" | "tf" => ExecutionFormat::Tensorflow,
            // ModelScope repositories are PyTorch checkpoints in practice.
            "modelscope" => ExecutionFormat::Pytorch,
            _ => ExecutionFormat::Onnx,
        }
    }
}

impl fmt::Display for ExecutionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a manifest's execution format string is terminal.
pub fn is_execution_ready(execution_format: &str) -> bool {
    ExecutionFormat::parse(execution_format)
        .map(|f| f.is_terminal())
        .unwrap_or(false)
}

/// Detect the execution format from file names, in priority order:
/// gguf, `model.onnx`, safetensors, pytorch, tensorflow, then the type hint.
pub fn detect_execution_format<S: AsRef<str>>(format_type: &str, files: &[S]) -> ExecutionFormat {
    let names: Vec<String> = files
        .iter()
        .map(|f| {
            let f = f.as_ref();
            f.rsplit('/').next().unwrap_or(f).to_lowercase()
        })
        .collect();

    if any_name(&names, |n| n.ends_with(".gguf")) {
        return ExecutionFormat::Gguf;
    }
    if any_name(&names, |n| n == "model.onnx") {
        return ExecutionFormat::Onnx;
    }
    if any_name(&names, |n| n.ends_with(".safetensors")) {
        return ExecutionFormat::Safetensors;
    }
    if any_name(&names, |n| {
        n.contains("pytorch") || n.ends_with(".pth") || n.ends_with(".pt") || n.ends_with(".bin")
    }) {
        return ExecutionFormat::Pytorch;
    }
    let saved_model_type = format_type.eq_ignore_ascii_case("saved_model");
    if any_name(&names, |n| {
        n.contains("tensorflow")
            || n.contains("saved_model")
            || n.ends_with(".pb")
            || n.ends_with(".h5")
            || (saved_model_type && n.ends_with(".tar.gz"))
    }) {
        return ExecutionFormat::Tensorflow;
    }
    ExecutionFormat::from_type_hint(format_type)
}

fn any_name(names: &[String], pred: impl Fn(&str) -> bool) -> bool {
    names.iter().any(|n| pred(n))
}

/// Set `spec.format.executionFormat` from the files in `model_dir`.
///
/// A GGUF file also rewrites the declared type, since GGUF is both source
/// and runtime format.
pub fn apply_execution_format(manifest: &mut Manifest, model_dir: &Path) -> Result<ExecutionFormat> {
    let mut names = Vec::new();
    if model_dir.is_dir() {
        for entry in std::fs::read_dir(model_dir).with_path(model_dir)? {
            let entry = entry.with_path(model_dir)?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();

    let detected = detect_execution_format(&manifest.spec.format.format_type, &names);
    if detected == ExecutionFormat::Gguf {
        manifest.spec.format.format_type = ExecutionFormat::Gguf.as_str().to_string();
    }
    manifest.spec.format.execution_format = Some(detected.as_str().to_string());
    Ok(detected)
}

/// Record the digest and size of the package actually written to disk.
pub fn update_with_checksum(manifest: &mut Manifest, package_path: &Path) -> Result<()> {
    let digest = compute_sha256(package_path)?;
    manifest.distribution.package.sha256 = digest.sha256;
    manifest.distribution.package.size = digest.size;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detection_priority() {
        assert_eq!(
            detect_execution_format("pytorch", &["model.safetensors", "model-q4_k_m.gguf"]),
            ExecutionFormat::Gguf
        );
        assert_eq!(
            detect_execution_format("pytorch", &["pytorch_model.bin", "model.onnx"]),
            ExecutionFormat::Onnx
        );
        assert_eq!(
            detect_execution_format("pytorch", &["config.json", "model.safetensors"]),
            ExecutionFormat::Safetensors
        );
        assert_eq!(
            detect_execution_format("", &["resnet18.pth"]),
            ExecutionFormat::Pytorch
        );
        assert_eq!(
            detect_execution_format("saved_model", &["model.tar.gz"]),
            ExecutionFormat::Tensorflow
        );
    }

    #[test]
    fn test_type_hint_fallback() {
        let none: [&str; 0] = [];
        assert_eq!(detect_execution_format("modelscope", &none), ExecutionFormat::Pytorch);
        assert_eq!(detect_execution_format("tf", &none), ExecutionFormat::Tensorflow);
        assert_eq!(detect_execution_format("mystery", &none), ExecutionFormat::Onnx);
    }

    #[test]
    fn test_terminal_set() {
        assert!(is_execution_ready("gguf"));
        assert!(is_execution_ready("ONNX"));
        assert!(!is_execution_ready("pytorch"));
        assert!(!is_execution_ready("safetensors"));
        assert!(!is_execution_ready(""));
    }

    #[test]
    fn test_apply_sets_gguf_type() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("llama-q4_0.gguf"), b"GGUF").unwrap();

        let mut manifest = Manifest::default();
        manifest.spec.format.format_type = "pytorch".into();
        let detected = apply_execution_format(&mut manifest, temp_dir.path()).unwrap();

        assert_eq!(detected, ExecutionFormat::Gguf);
        assert_eq!(manifest.spec.format.format_type, "gguf");
        assert_eq!(manifest.execution_format(), Some("gguf"));
    }

    #[test]
    fn test_update_with_checksum_uses_written_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let package = temp_dir.path().join("pkg.axon");
        std::fs::write(&package, b"archive bytes").unwrap();

        let mut manifest = Manifest::default();
        manifest.distribution.package.sha256 = "placeholder".into();
        update_with_checksum(&mut manifest, &package).unwrap();

        assert_eq!(
            manifest.distribution.package.sha256,
            crate::hashing::sha256_bytes(b"archive bytes")
        );
        assert_eq!(manifest.distribution.package.size, 13);
    }
}
