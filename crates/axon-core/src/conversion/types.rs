//! Types for ONNX conversion and artifact classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Shape of a conversion output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    Single,
    MultiEncoder,
    EncoderDecoder,
    MultiModel,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Single => "single",
            Architecture::MultiEncoder => "multi-encoder",
            Architecture::EncoderDecoder => "encoder-decoder",
            Architecture::MultiModel => "multi-model",
        }
    }

    pub fn is_multi_component(&self) -> bool {
        !matches!(self, Architecture::Single)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a conversion produced, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub success: bool,
    pub is_multi_component: bool,
    /// The single exported file; `None` for multi-component exports.
    pub primary_file: Option<PathBuf>,
    pub all_files: Vec<PathBuf>,
    pub descriptor_path: Option<PathBuf>,
    pub architecture: Architecture,
}

impl ConversionResult {
    /// Nothing usable was found.
    pub fn empty() -> Self {
        Self {
            success: false,
            is_multi_component: false,
            primary_file: None,
            all_files: Vec::new(),
            descriptor_path: None,
            architecture: Architecture::Single,
        }
    }

    pub fn single(file: PathBuf) -> Self {
        Self {
            success: true,
            is_multi_component: false,
            primary_file: Some(file.clone()),
            all_files: vec![file],
            descriptor_path: None,
            architecture: Architecture::Single,
        }
    }
}

/// `onnx_manifest.json`: persisted classification of a multi-component export.
///
/// `components` maps a role (`text_encoder`, `decoder`) to a file path
/// relative to the model directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiComponentDescriptor {
    pub architecture: Architecture,
    #[serde(rename = "encoder_type", alias = "componentType", alias = "component_type")]
    pub component_type: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Conversion strategies, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStrategy {
    PreConverted,
    Container,
    LocalInterpreter,
}

impl fmt::Display for ConversionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConversionStrategy::PreConverted => "pre-converted download",
            ConversionStrategy::Container => "container",
            ConversionStrategy::LocalInterpreter => "local interpreter",
        })
    }
}

/// Successful end states of the conversion ladder.
///
/// Failures are returned as errors. `Skipped` means the caller should carry
/// on with the unconverted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The execution format is already terminal.
    NotNeeded,
    Converted {
        strategy: ConversionStrategy,
        result: ConversionResult,
    },
    Skipped {
        reason: String,
    },
}

impl ConversionOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        match self {
            ConversionOutcome::Converted { result, .. } => Some(result),
            _ => None,
        }
    }
}

impl fmt::Display for ConversionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionOutcome::NotNeeded => f.write_str("not needed"),
            ConversionOutcome::Converted { strategy, result } => {
                write!(f, "converted via {} ({})", strategy, result.architecture)
            }
            ConversionOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// Inputs for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Cached model directory holding the unpacked source files.
    pub model_dir: PathBuf,
    pub framework: String,
    pub namespace: String,
    /// Identifier used for repository lookups (`bert-base-uncased`, `owner/model`).
    pub model_id: String,
    pub execution_format: Option<String>,
}

impl ConversionRequest {
    /// Where a single-file export is written.
    pub fn output_path(&self) -> PathBuf {
        self.model_dir
            .join(crate::config::ConversionConfig::ONNX_FILENAME)
    }
}
