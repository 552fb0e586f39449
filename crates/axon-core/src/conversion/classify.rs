//! Classify a conversion output directory as single or multi-component.
//!
//! Classification is a pure function of file names. The synthesized
//! `onnx_manifest.json` caches it so later reads skip the heuristics.

use super::types::{Architecture, ConversionResult, MultiComponentDescriptor};
use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::config::ConversionConfig;
use crate::error::{IoResultExt, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ONNX_EXTENSION: &str = "onnx";

/// Known multi-file export layouts, matched on base names.
struct KnownLayout {
    architecture: Architecture,
    component_type: &'static str,
    task: &'static str,
    /// `(role, file)`; the first two are required.
    roles: &'static [(&'static str, &'static str)],
}

const KNOWN_LAYOUTS: &[KnownLayout] = &[
    KnownLayout {
        architecture: Architecture::MultiEncoder,
        component_type: "clip",
        task: "zero-shot-image-classification",
        roles: &[
            ("text_encoder", "text_model.onnx"),
            ("vision_encoder", "vision_model.onnx"),
        ],
    },
    KnownLayout {
        architecture: Architecture::EncoderDecoder,
        component_type: "seq2seq",
        task: "text2text-generation",
        roles: &[
            ("encoder", "encoder_model.onnx"),
            ("decoder", "decoder_model.onnx"),
            ("decoder_with_past", "decoder_with_past_model.onnx"),
        ],
    },
];

pub fn descriptor_path(model_dir: &Path) -> PathBuf {
    model_dir.join(ConversionConfig::DESCRIPTOR_FILENAME)
}

pub fn read_descriptor(model_dir: &Path) -> Result<Option<MultiComponentDescriptor>> {
    atomic_read_json(&descriptor_path(model_dir))
}

pub fn write_descriptor(model_dir: &Path, descriptor: &MultiComponentDescriptor) -> Result<PathBuf> {
    let path = descriptor_path(model_dir);
    atomic_write_json(&path, descriptor)?;
    Ok(path)
}

/// All `.onnx` files in `model_dir` and its `onnx/` subdirectory, sorted.
pub fn find_artifacts(model_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for dir in [
        model_dir.to_path_buf(),
        model_dir.join(ConversionConfig::ONNX_SUBDIR),
    ] {
        if !dir.is_dir() {
            continue;
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_path(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ONNX_EXTENSION))
            .collect();
        files.sort();
        found.extend(files);
    }
    Ok(found)
}

/// Classify the output of a conversion into `model_dir`.
///
/// Priority: a valid persisted descriptor, then `expected_output`, then a
/// directory scan. A recognised multi-file layout gets a descriptor written.
pub fn classify(model_dir: &Path, expected_output: &Path) -> Result<ConversionResult> {
    match read_descriptor(model_dir) {
        Ok(Some(descriptor)) => {
            if let Some(result) = from_descriptor(model_dir, &descriptor) {
                debug!("Using persisted descriptor in {}", model_dir.display());
                return Ok(result);
            }
            warn!(
                "Descriptor in {} references missing files, re-scanning",
                model_dir.display()
            );
        }
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable descriptor in {}: {}", model_dir.display(), e),
    }

    if expected_output.is_file() {
        return Ok(ConversionResult::single(expected_output.to_path_buf()));
    }

    let files = find_artifacts(model_dir)?;
    match files.len() {
        0 => Ok(ConversionResult::empty()),
        1 => Ok(ConversionResult::single(files[0].clone())),
        _ => classify_multiple(model_dir, files),
    }
}

fn from_descriptor(model_dir: &Path, descriptor: &MultiComponentDescriptor) -> Option<ConversionResult> {
    let referenced = descriptor.files.iter().chain(descriptor.components.values());
    for rel in referenced {
        if !model_dir.join(rel).is_file() {
            return None;
        }
    }
    if descriptor.files.is_empty() {
        return None;
    }

    Some(ConversionResult {
        success: true,
        is_multi_component: descriptor.architecture.is_multi_component(),
        primary_file: None,
        all_files: descriptor.files.iter().map(|f| model_dir.join(f)).collect(),
        descriptor_path: Some(descriptor_path(model_dir)),
        architecture: descriptor.architecture,
    })
}

fn classify_multiple(model_dir: &Path, files: Vec<PathBuf>) -> Result<ConversionResult> {
    let relative: Vec<String> = files
        .iter()
        .map(|f| {
            f.strip_prefix(model_dir)
                .unwrap_or(f)
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    let base_name = |rel: &str| rel.rsplit('/').next().unwrap_or(rel).to_string();

    let mut result = ConversionResult {
        success: true,
        is_multi_component: true,
        primary_file: None,
        all_files: files,
        descriptor_path: None,
        architecture: Architecture::MultiModel,
    };

    for layout in KNOWN_LAYOUTS {
        let mut components = BTreeMap::new();
        for (role, file) in layout.roles {
            if let Some(rel) = relative.iter().find(|r| base_name(r) == *file) {
                components.insert(role.to_string(), rel.clone());
            }
        }
        let required_present = layout.roles[..2]
            .iter()
            .all(|(role, _)| components.contains_key(*role));
        if !required_present {
            continue;
        }

        let descriptor = MultiComponentDescriptor {
            architecture: layout.architecture,
            component_type: layout.component_type.to_string(),
            task: layout.task.to_string(),
            components,
            files: relative.clone(),
        };
        result.architecture = layout.architecture;
        result.descriptor_path = Some(write_descriptor(model_dir, &descriptor)?);
        debug!(
            "Classified {} as {} ({})",
            model_dir.display(),
            layout.architecture,
            layout.component_type
        );
        break;
    }
    Ok(result)
}
