//! Adapter ordering, search aggregation and manifest persistence.

use async_trait::async_trait;
use axon_core::manifest::{self, Framework, ModelFile, TensorSpec};
use axon_core::network::ProgressCallback;
use axon_core::{
    AdapterRegistry, AxonConfig, AxonError, CancellationToken, Manifest, ModelIdentifier,
    RepositoryAdapter, SearchResult,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config(registry_url: &str, enable_huggingface: bool) -> AxonConfig {
    let mut config = AxonConfig::default();
    config.registry.url = registry_url.to_string();
    config.registry.enable_huggingface = enable_huggingface;
    config
}

#[test]
fn test_default_order_is_fixed() {
    let registry = AdapterRegistry::with_defaults(&config("http://registry.local", true)).unwrap();
    assert_eq!(
        registry.names(),
        ["local", "pytorch-hub", "tensorflow-hub", "modelscope", "huggingface"]
    );

    // Rebuilding yields the same order.
    let again = AdapterRegistry::with_defaults(&config("http://registry.local", true)).unwrap();
    assert_eq!(again.names(), registry.names());
}

#[test]
fn test_first_match_wins() {
    let registry = AdapterRegistry::with_defaults(&config("http://registry.local", true)).unwrap();
    let cases = [
        ("hf", "bert-base-uncased", "huggingface"),
        ("pytorch", "vision/resnet50", "pytorch-hub"),
        ("torch", "vision/resnet50", "pytorch-hub"),
        ("tfhub", "google/imagenet/mobilenet_v2", "tensorflow-hub"),
        ("ms", "damo/nlp_bert", "modelscope"),
        ("acme", "widget", "local"),
    ];
    for (namespace, name, expected) in cases {
        let adapter = registry.resolve(namespace, name).unwrap();
        assert_eq!(adapter.name(), expected, "{}/{}", namespace, name);
    }
}

#[test]
fn test_catch_all_only_when_enabled() {
    let with_hf = AdapterRegistry::with_defaults(&config("", true)).unwrap();
    assert_eq!(with_hf.resolve("acme", "widget").unwrap().name(), "huggingface");

    let without = AdapterRegistry::with_defaults(&config("", false)).unwrap();
    assert!(!without.names().contains(&"local".to_string()));
    match without.resolve("acme", "widget") {
        Err(e @ AxonError::AdapterNotFound { .. }) => assert!(!e.is_retryable()),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(adapter) => panic!("resolved to {}", adapter.name()),
    }
}

struct FixedSearch {
    name: &'static str,
    hits: Option<Vec<&'static str>>,
}

#[async_trait]
impl RepositoryAdapter for FixedSearch {
    fn name(&self) -> &str {
        self.name
    }

    fn can_handle(&self, _namespace: &str, _name: &str) -> bool {
        true
    }

    async fn describe(
        &self,
        id: &ModelIdentifier,
        _cancel: &CancellationToken,
    ) -> axon_core::Result<Manifest> {
        Ok(Manifest::for_identifier(id))
    }

    async fn materialize(
        &self,
        _manifest: &mut Manifest,
        _destination: &Path,
        _progress: Option<&ProgressCallback>,
        _cancel: &CancellationToken,
    ) -> axon_core::Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &str) -> axon_core::Result<Vec<SearchResult>> {
        match &self.hits {
            Some(hits) => Ok(hits
                .iter()
                .map(|name| SearchResult {
                    namespace: self.name.to_string(),
                    name: name.to_string(),
                    version: "latest".to_string(),
                    description: String::new(),
                    framework: None,
                    tags: Vec::new(),
                })
                .collect()),
            None => Err(AxonError::network("search backend down")),
        }
    }
}

#[tokio::test]
async fn test_search_all_keeps_order_and_skips_failures() {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(FixedSearch {
        name: "first",
        hits: Some(vec!["a", "b"]),
    }));
    registry.register(Arc::new(FixedSearch {
        name: "broken",
        hits: None,
    }));
    registry.register(Arc::new(FixedSearch {
        name: "last",
        hits: Some(vec!["c"]),
    }));

    assert_eq!(registry.resolve("any", "thing").unwrap().name(), "first");

    let results = registry.search_all("query").await;
    let names: Vec<String> = results
        .iter()
        .map(|r| format!("{}/{}", r.namespace, r.name))
        .collect();
    assert_eq!(names, ["first/a", "first/b", "last/c"]);
}

#[test]
fn test_manifest_yaml_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("manifest.yaml");
    let id = ModelIdentifier::parse("hf/bert-base-uncased@latest").unwrap();

    let mut original = Manifest::for_identifier(&id);
    original.metadata.description = "BERT base model (uncased)".into();
    original.metadata.license = "apache-2.0".into();
    original.spec.framework = Framework {
        name: "PyTorch".into(),
        version: "2.0.0".into(),
    };
    original.spec.format.format_type = "pytorch".into();
    original.spec.format.execution_format = Some("onnx".into());
    original.spec.format.files = vec![ModelFile {
        path: "pytorch_model.bin".into(),
        size: 440_473_133,
        sha256: "a".repeat(64),
    }];
    original.spec.io.inputs = vec![TensorSpec::new("input_ids", "int64", &[-1, -1])];
    original.spec.io.outputs = vec![TensorSpec::new("last_hidden_state", "float32", &[-1, -1, 768])];
    original.distribution.package.url =
        "https://huggingface.co/bert-base-uncased/resolve/main/pytorch_model.bin".into();
    original.distribution.package.mirrors = vec!["https://mirror.example/bert.axon".into()];
    original.distribution.package.sha256 = "b".repeat(64);
    original.distribution.package.size = 440_473_133;

    manifest::write_file(&original, &path).unwrap();
    let parsed = manifest::parse_file(&path).unwrap();

    assert_eq!(parsed, original);
    assert_eq!(parsed.full_version(), "hf/bert-base-uncased@latest");
    assert_eq!(parsed.identifier(), id);

    let yaml = std::fs::read_to_string(&path).unwrap();
    assert!(yaml.contains("executionFormat: onnx"));
}
