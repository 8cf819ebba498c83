//! Shared test utilities: router construction over a temp cache directory,
//! in-memory stats, and in-process mock upstreams.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::sync::RwLock;
use tower::ServiceExt;

use registry_cache::api::{routes, AppState};
use registry_cache::cache::CacheStore;
use registry_cache::config::Config;
use registry_cache::ecosystem::Ecosystem;
use registry_cache::stats::sampler::CacheSnapshot;
use registry_cache::stats::{InMemoryPackageStats, PackageStats};

/// A router wired to a temp cache directory and in-memory stats.
pub struct TestServer {
    pub router: Router,
    pub state: Arc<AppState>,
    pub stats: Arc<InMemoryPackageStats>,
    pub cache_dir: tempfile::TempDir,
}

impl TestServer {
    pub fn new(ecosystem: Ecosystem, upstream: &str) -> Self {
        let cache_dir = tempfile::tempdir().expect("tempdir");
        let stats = Arc::new(InMemoryPackageStats::new());

        let config = Config {
            database_url: "postgres://unused".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            cache_dir: None,
            upstream: Some(upstream.to_string()),
        };

        let stats_dyn: Arc<dyn PackageStats> = stats.clone();
        let state = Arc::new(AppState::new(
            config,
            ecosystem,
            CacheStore::new(cache_dir.path()),
            stats_dyn,
            Arc::new(RwLock::new(CacheSnapshot::default())),
        ));

        let router = routes::create_router(state.clone());
        Self {
            router,
            state,
            stats,
            cache_dir,
        }
    }

    /// Write a file directly into the cache directory.
    pub fn seed_file(&self, name: &str, content: &[u8]) {
        std::fs::write(self.cache_dir.path().join(name), content).expect("seed cache file");
    }

    pub fn cache_path(&self, name: &str) -> std::path::PathBuf {
        self.cache_dir.path().join(name)
    }
}

/// Start an in-process upstream and return its origin URL.
pub async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Bind first so the origin URL is known while building the routes.
pub async fn spawn_upstream_with(build: impl FnOnce(String) -> Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let origin = format!("http://{}", listener.local_addr().unwrap());
    let app = build(origin.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    origin
}

/// Drive one request through the router and return status, headers and body.
pub async fn send(
    router: &Router,
    request: Request<Body>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.expect("oneshot");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec();
    (status, headers, body)
}

/// JSON POST helper.
pub fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}
