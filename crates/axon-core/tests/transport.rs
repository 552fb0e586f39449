//! Existence checks by status class, and downloads cancelled mid-body.

mod common;

use axon_core::network::{Downloader, ExistenceProbe, HttpClient, ProbeVerdict, ProgressCallback};
use axon_core::{AxonError, CancellationToken};
use axum::body::Body;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use common::{Canned, FixtureServer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn hub_routes() -> HashMap<String, Canned> {
    HashMap::from([
        (
            "/short".to_string(),
            Canned::status(StatusCode::RANGE_NOT_SATISFIABLE),
        ),
        (
            "/partial".to_string(),
            Canned {
                status: StatusCode::PARTIAL_CONTENT,
                ..Canned::bytes(vec![0u8; 1024])
            },
        ),
        ("/auth".to_string(), Canned::status(StatusCode::UNAUTHORIZED)),
        (
            "/down".to_string(),
            Canned::status(StatusCode::SERVICE_UNAVAILABLE),
        ),
        (
            "/google/bert".to_string(),
            Canned::html("<html><head><title>bert | TensorFlow Hub</title></head></html>"),
        ),
        (
            "/search-page".to_string(),
            Canned::html("<html><head><title>Search results - hub</title></head></html>"),
        ),
        ("/google/missing".to_string(), Canned::redirect("/models")),
        (
            "/models".to_string(),
            Canned::html("<html><head><title>TensorFlow Hub</title></head></html>"),
        ),
        ("/google/renamed".to_string(), Canned::redirect("/google/bert")),
    ])
}

#[tokio::test]
async fn test_existence_verdict_per_status_class() {
    let server = FixtureServer::start(hub_routes()).await;
    let checker = ExistenceProbe::new().unwrap();
    let cancel = CancellationToken::new();

    let cases = [
        ("/short", ProbeVerdict::Exists),
        ("/partial", ProbeVerdict::Exists),
        ("/auth", ProbeVerdict::Indeterminate(401)),
        ("/down", ProbeVerdict::Indeterminate(503)),
        ("/gone", ProbeVerdict::Absent),
        ("/google/bert", ProbeVerdict::Exists),
        ("/search-page", ProbeVerdict::Absent),
        ("/google/missing", ProbeVerdict::Absent),
        ("/google/renamed", ProbeVerdict::Exists),
    ];
    for (path, expected) in cases {
        let verdict = checker.probe(&server.url(path), &cancel).await.unwrap();
        assert_eq!(verdict, expected, "{}", path);
    }

    assert!(ProbeVerdict::Indeterminate(401).might_exist());
    assert_eq!(server.hit_count("/models"), 1);
}

#[tokio::test]
async fn test_existence_check_honours_cancellation() {
    let server = FixtureServer::start(hub_routes()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = ExistenceProbe::new()
        .unwrap()
        .probe(&server.url("/short"), &cancel)
        .await;
    assert!(matches!(result, Err(AxonError::Cancelled)));
}

/// Serves one chunk of `/slow.bin`, then stalls before the rest.
async fn stalling_server() -> String {
    let app = Router::new().route(
        "/slow.bin",
        get(|| async {
            let chunks = futures::stream::unfold(0u8, |step| async move {
                if step == 0 {
                    Some((Ok::<_, std::io::Error>(vec![7u8; 4096]), 1))
                } else {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    None
                }
            });
            Body::from_stream(chunks)
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/slow.bin", addr)
}

#[tokio::test]
async fn test_cancel_mid_body_removes_part_file() {
    let url = stalling_server().await;
    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("model.bin");
    let downloader = Downloader::new(Arc::new(HttpClient::new().unwrap()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let progress: &ProgressCallback = &move |done: u64, _total: u64| {
        if done > 0 {
            trigger.cancel();
        }
    };

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        downloader.download(&url, &destination, Some(progress), &cancel),
    )
    .await
    .expect("cancelled download should return promptly");

    assert!(matches!(result, Err(AxonError::Cancelled)));
    assert!(!destination.exists());
    assert!(!downloader.temp_path_for(&destination).exists());
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}
