//! Shared fixtures: an in-process HTTP server with canned responses.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One canned response.
#[derive(Clone)]
pub struct Canned {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// `Location` header, for redirects.
    pub location: Option<String>,
}

impl Canned {
    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/octet-stream",
            body: body.into(),
            location: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
            location: None,
        }
    }

    pub fn html(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/html; charset=utf-8",
            body: body.as_bytes().to_vec(),
            location: None,
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
            location: None,
        }
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self {
            location: Some(location.to_string()),
            ..Self::status(StatusCode::FOUND)
        }
    }
}

/// A running fixture server. Unknown paths answer 404.
pub struct FixtureServer {
    pub base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl FixtureServer {
    pub async fn start(routes: HashMap<String, Canned>) -> Self {
        let routes = Arc::new(routes);
        let hits = Arc::new(Mutex::new(Vec::new()));

        let handler_routes = routes.clone();
        let handler_hits = hits.clone();
        let app = Router::new().fallback(move |uri: Uri| {
            let routes = handler_routes.clone();
            let hits = handler_hits.clone();
            async move {
                let path = uri.path().to_string();
                hits.lock().unwrap().push(path.clone());
                respond(routes.get(&path))
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fixture listener");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Number of requests seen for `path`.
    pub fn hit_count(&self, path: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

fn respond(canned: Option<&Canned>) -> Response {
    match canned {
        Some(canned) => {
            let mut response = (
                canned.status,
                [(header::CONTENT_TYPE, canned.content_type)],
                Body::from(canned.body.clone()),
            )
                .into_response();
            if let Some(location) = canned.location.as_deref() {
                if let Ok(value) = header::HeaderValue::from_str(location) {
                    response.headers_mut().insert(header::LOCATION, value);
                }
            }
            response
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Bytes that pass artifact validation: a valid field tag and over 1 KiB.
pub fn onnx_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x01u8; len.max(2048)];
    bytes[0] = 0x08;
    bytes[1] = 0x07;
    bytes
}
