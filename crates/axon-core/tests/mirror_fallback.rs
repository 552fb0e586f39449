//! Mirror fallback through the downloader and the generic registry adapter.

mod common;

use axon_core::adapters::{HttpAdapterConfig, LocalRegistryAdapter};
use axon_core::hashing::sha256_bytes;
use axon_core::manifest::{self, ModelFile};
use axon_core::network::{Downloader, HttpClient, RetryConfig};
use axon_core::package::PackageBuilder;
use axon_core::{
    AdapterRegistry, AxonError, CacheManager, CancellationToken, ConversionOutcome, Installer,
    Manifest, ModelIdentifier, RepositoryAdapter,
};
use axum::http::StatusCode;
use common::{onnx_bytes, Canned, FixtureServer};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn downloader() -> Downloader {
    Downloader::new(Arc::new(HttpClient::new().unwrap())).with_retry(RetryConfig::no_retry())
}

#[tokio::test]
async fn test_failing_primary_falls_back_to_mirror() {
    let good = b"the real package".to_vec();
    let server = FixtureServer::start(HashMap::from([
        ("/primary/pkg.axon".to_string(), Canned::status(StatusCode::NOT_FOUND)),
        ("/corrupt/pkg.axon".to_string(), Canned::bytes(b"tampered".to_vec())),
        ("/mirror/pkg.axon".to_string(), Canned::bytes(good.clone())),
    ]))
    .await;

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("pkg.axon");
    let sources = vec![
        server.url("/primary/pkg.axon"),
        server.url("/corrupt/pkg.axon"),
        server.url("/mirror/pkg.axon"),
    ];

    let outcome = downloader()
        .download_from_sources(
            &sources,
            &dest,
            Some(&sha256_bytes(&good)),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.url, sources[2]);
    assert_eq!(outcome.failed_sources, sources[..2].to_vec());
    assert_eq!(std::fs::read(&dest).unwrap(), good);
    assert!(!temp_dir.path().join("pkg.axon.part").exists());
}

#[tokio::test]
async fn test_all_sources_failing_quotes_last_error() {
    let server = FixtureServer::start(HashMap::from([(
        "/bad/pkg.axon".to_string(),
        Canned::bytes(b"wrong".to_vec()),
    )]))
    .await;

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("pkg.axon");
    let sources = vec![server.url("/missing/pkg.axon"), server.url("/bad/pkg.axon")];

    let result = downloader()
        .download_from_sources(
            &sources,
            &dest,
            Some(&sha256_bytes(b"right")),
            None,
            &CancellationToken::new(),
        )
        .await;

    match result {
        Err(AxonError::AllSourcesFailed { attempts, last_error }) => {
            assert_eq!(attempts, 2);
            assert!(last_error.to_lowercase().contains("checksum"), "{}", last_error);
        }
        other => panic!("expected AllSourcesFailed, got {:?}", other),
    }
    assert!(!dest.exists());
    assert!(!temp_dir.path().join("pkg.axon.part").exists());
}

#[tokio::test]
async fn test_registry_install_uses_mirror_base_and_mirror_package() {
    let id = ModelIdentifier::parse("acme/widget@1.0.0").unwrap();

    let mut builder = PackageBuilder::new().unwrap();
    builder.add_bytes("model.onnx", &onnx_bytes(4096)).unwrap();
    let scratch = TempDir::new().unwrap();
    let package_path = scratch.path().join("widget.axon");
    let digest = builder.build(&package_path).unwrap();
    let package_bytes = std::fs::read(&package_path).unwrap();

    // The server address is only known after start, so the manifest is
    // served from a second fixture that points at the first.
    let packages = FixtureServer::start(HashMap::from([(
        "/mirror/widget.axon".to_string(),
        Canned::bytes(package_bytes),
    )]))
    .await;

    let mut published = Manifest::for_identifier(&id);
    published.metadata.description = "Widget detector".into();
    published.spec.framework.name = "ONNX".into();
    published.spec.format.format_type = "onnx".into();
    published.spec.format.files = vec![ModelFile::pending("model.onnx")];
    published.distribution.package.url = packages.url("/primary/widget.axon");
    published.distribution.package.mirrors = vec![packages.url("/mirror/widget.axon")];
    published.distribution.package.sha256 = digest.sha256.clone();
    published.distribution.package.size = digest.size;
    let manifest_yaml = manifest::to_yaml_string(&published).unwrap();

    let registry_server = FixtureServer::start(HashMap::from([(
        "/backup/models/acme/widget/1.0.0/manifest".to_string(),
        Canned {
            status: StatusCode::OK,
            content_type: "application/yaml",
            body: manifest_yaml.into_bytes(),
            location: None,
        },
    )]))
    .await;

    let adapter = LocalRegistryAdapter::new(
        HttpAdapterConfig::new(registry_server.url("/primary")),
        vec![registry_server.url("/backup")],
    )
    .unwrap();
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(adapter));

    let temp_dir = TempDir::new().unwrap();
    let installer = Installer::new(
        registry,
        CacheManager::new(temp_dir.path()),
        Some(axon_core::Converter::new().unwrap()),
    );

    let report = installer
        .install(&id, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.adapter, "local");
    assert_eq!(report.sha256, digest.sha256);
    assert_eq!(report.conversion, Some(ConversionOutcome::NotNeeded));
    assert!(report.path.join("model.onnx").is_file());
    assert_eq!(packages.hit_count("/primary/widget.axon"), 1);
    assert_eq!(packages.hit_count("/mirror/widget.axon"), 1);
    assert_eq!(
        registry_server.hit_count("/primary/models/acme/widget/1.0.0/manifest"),
        1
    );

    let cached = installer.cache().load_manifest(&id).unwrap();
    assert_eq!(cached.execution_format(), Some("onnx"));
    assert_eq!(installer.cache().verify(&id).unwrap().sha256, digest.sha256);
}

#[tokio::test]
async fn test_registry_manifest_with_escaping_file_path_is_refused() {
    let id = ModelIdentifier::parse("acme/widget@1.0.0").unwrap();
    let mut published = Manifest::for_identifier(&id);
    published.spec.format.files = vec![
        ModelFile::pending("model.onnx"),
        ModelFile::pending("../../../.bashrc"),
    ];
    let manifest_yaml = manifest::to_yaml_string(&published).unwrap();

    let registry_server = FixtureServer::start(HashMap::from([(
        "/models/acme/widget/1.0.0/manifest".to_string(),
        Canned {
            content_type: "application/yaml",
            ..Canned::bytes(manifest_yaml.into_bytes())
        },
    )]))
    .await;
    let adapter =
        LocalRegistryAdapter::new(HttpAdapterConfig::new(registry_server.base_url.clone()), vec![])
            .unwrap();

    match adapter.describe(&id, &CancellationToken::new()).await {
        Err(AxonError::Validation { field, .. }) => {
            assert_eq!(field, "spec.format.files[1].path");
        }
        other => panic!("expected Validation, got {:?}", other),
    }
}
