//! YAML reading and writing for manifests.

use super::types::Manifest;
use crate::atomic::atomic_write_bytes;
use crate::error::{AxonError, IoResultExt, Result};
use std::path::Path;

/// Parse a manifest from YAML bytes.
pub fn parse_bytes(data: &[u8]) -> Result<Manifest> {
    serde_yaml::from_slice(data).map_err(|e| AxonError::Yaml {
        message: format!("Failed to parse manifest: {}", e),
        source: Some(e),
    })
}

/// Parse a manifest file.
pub fn parse_file(path: &Path) -> Result<Manifest> {
    let data = std::fs::read(path).with_path(path)?;
    parse_bytes(&data).map_err(|e| match e {
        AxonError::Yaml { message, source } => AxonError::Yaml {
            message: format!("{} ({})", message, path.display()),
            source,
        },
        other => other,
    })
}

/// Render a manifest as YAML.
pub fn to_yaml_string(manifest: &Manifest) -> Result<String> {
    Ok(serde_yaml::to_string(manifest)?)
}

/// Write a manifest atomically.
pub fn write_file(manifest: &Manifest, path: &Path) -> Result<()> {
    let yaml = to_yaml_string(manifest)?;
    atomic_write_bytes(path, yaml.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ModelIdentifier;
    use crate::manifest::types::*;
    use tempfile::TempDir;

    fn sample_manifest() -> Manifest {
        let id = ModelIdentifier::new("hf", "bert-base-uncased", "latest");
        let mut manifest = Manifest::for_identifier(&id);
        manifest.metadata.description = "BERT base".into();
        manifest.metadata.license = "apache-2.0".into();
        manifest.metadata.tags = vec!["nlp".into(), "fill-mask".into()];
        manifest.spec.framework = Framework {
            name: "PyTorch".into(),
            version: "2.0.0".into(),
        };
        manifest.spec.format = Format {
            format_type: "pytorch".into(),
            execution_format: Some("onnx".into()),
            multi_encoder: None,
            files: vec![ModelFile {
                path: "pytorch_model.bin".into(),
                size: 440_473_133,
                sha256: "ab".repeat(32),
            }],
        };
        manifest.spec.io.inputs = vec![TensorSpec::new("input_ids", "int64", &[-1, -1])
            .with_preprocessing(Preprocessing {
                kind: "tokenization".into(),
                tokenizer: Some("tokenizer.json".into()),
                tokenizer_type: Some("bert".into()),
                config: Default::default(),
            })];
        manifest.spec.io.outputs = vec![TensorSpec::new("logits", "float32", &[-1, -1, -1])];
        manifest.spec.requirements.compute = Compute::baseline();
        manifest.distribution = Distribution {
            package: PackageInfo {
                url: "https://huggingface.co/bert-base-uncased/resolve/main/pytorch_model.bin"
                    .into(),
                size: 1234,
                sha256: "cd".repeat(32),
                mirrors: vec!["https://mirror.example/bert.axon".into()],
            },
            registry: RegistryInfo {
                url: "https://huggingface.co".into(),
                namespace: "huggingface".into(),
            },
        };
        manifest
    }

    #[test]
    fn test_round_trip_is_field_for_field_equal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.yaml");
        let manifest = sample_manifest();

        write_file(&manifest, &path).unwrap();
        let parsed = parse_file(&path).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_external_field_names() {
        let yaml = to_yaml_string(&sample_manifest()).unwrap();
        assert!(yaml.contains("apiVersion: axon.mlos.io/v1"));
        assert!(yaml.contains("executionFormat: onnx"));
        assert!(yaml.contains("sha256:"));
        assert!(yaml.contains("mirrors:"));
    }

    #[test]
    fn test_accepts_snake_case_execution_format() {
        let yaml = r#"
apiVersion: axon.mlos.io/v1
kind: Model
metadata:
  name: resnet
  namespace: acme
  version: 1.0.0
spec:
  framework:
    name: pytorch
    version: "2.1"
  format:
    type: pytorch
    execution_format: pytorch
    files:
      - path: weights/resnet.pth
        size: 10
        sha256: ""
  io:
    inputs:
      - name: input
        dtype: float32
        shape: [-1, 3, 224, 224]
distribution:
  package:
    url: http://registry.local/acme/resnet.axon
"#;
        let manifest = parse_bytes(yaml.as_bytes()).unwrap();
        assert_eq!(manifest.execution_format(), Some("pytorch"));
        assert_eq!(manifest.spec.io.inputs[0].shape, vec![-1, 3, 224, 224]);
        assert_eq!(manifest.full_version(), "acme/resnet@1.0.0");
    }

    #[test]
    fn test_parse_error_is_yaml_error() {
        let err = parse_bytes(b"apiVersion: [unterminated").unwrap_err();
        assert!(matches!(err, AxonError::Yaml { .. }));
    }
}
