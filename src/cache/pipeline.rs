//! The artifact download pipeline.
//!
//! Key derivation → cache probe → per-key lock → re-probe → upstream fetch
//! → stream to a temp file through a SHA-512 tee → size verification →
//! atomic rename → serve. Any visible file at the final path is complete;
//! partial downloads only ever exist under the `.tmp` suffix and are
//! unlinked on failure.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use sha2::{Digest, Sha512};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::api::AppState;
use crate::error::{AppError, Result};

/// Handle a classified artifact GET for `path`.
pub async fn fetch_artifact(state: &AppState, path: &str) -> Result<Response> {
    let key = state.ecosystem.cache_key(path);

    // Fast path: no lock needed when the file is already installed.
    if let Some(len) = state.store.probe(&key).await {
        tracing::info!(key = %key, "serving from cache");
        record_access(state, &key, true);
        return serve_file(state, &key, len).await;
    }

    let lock = state.locks.acquire(&key);
    let _guard = lock.lock().await;

    // Another request may have installed the file while we waited.
    if let Some(len) = state.store.probe(&key).await {
        tracing::info!(key = %key, "serving from cache (after lock)");
        record_access(state, &key, true);
        return serve_file(state, &key, len).await;
    }

    record_access(state, &key, false);

    let url = state.ecosystem.upstream_url(&state.upstream, path);
    tracing::info!(key = %key, url = %url, "cache miss, fetching from upstream");

    let response = state
        .client
        .get(&url)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("fetch of {url} failed: {e}")))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(AppError::Upstream(format!("{url} returned status {status}")));
    }

    // The guard unlinks the temp file on every failure path, including
    // this future being dropped on client disconnect.
    let temp = state.store.temp_path_for(&key);
    let mut temp_guard = TempGuard::new(temp.clone());

    let (written, digest) = stream_to_temp(response, &temp).await?;

    // The file on disk must hold exactly the bytes the copy produced.
    let on_disk = fs::metadata(&temp).await?.len();
    if on_disk != written {
        return Err(AppError::Integrity(format!(
            "wrote {written} bytes but {on_disk} are on disk for {key}"
        )));
    }

    // Rename is the linearization point; the lock is held through it.
    fs::rename(&temp, state.store.path_for(&key)).await?;
    temp_guard.disarm();

    tracing::info!(key = %key, size = written, sha512 = %&digest[..16], "cached artifact");

    serve_file(state, &key, written).await
}

/// Removes the temp file on drop unless the download was installed.
struct TempGuard {
    path: Option<PathBuf>,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Copy the upstream body into `temp`, hashing as it goes.
/// Returns the byte count and hex digest. The caller removes `temp` on error.
async fn stream_to_temp(response: reqwest::Response, temp: &Path) -> Result<(u64, String)> {
    let mut file = fs::File::create(temp).await?;
    let mut hasher = Sha512::new();
    let mut written: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| AppError::Internal(format!("download interrupted: {e}")))?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok((written, format!("{:x}", hasher.finalize())))
}

/// Stream the installed file, with Content-Length taken from the filesystem.
async fn serve_file(state: &AppState, key: &str, len: u64) -> Result<Response> {
    let file = fs::File::open(state.store.path_for(key)).await?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(key))
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

/// Content type by artifact extension.
fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(".tgz") || key.ends_with(".tar.gz") {
        "application/gzip"
    } else if key.ends_with(".zip") || key.ends_with(".whl") {
        "application/zip"
    } else {
        "application/octet-stream"
    }
}

/// Fire-and-forget stats update; a stats failure never fails the response.
fn record_access(state: &AppState, key: &str, hit: bool) {
    let stats = state.stats.clone();
    let key = key.to_string();
    tokio::spawn(async move {
        if let Err(e) = stats.record_access(&key, hit).await {
            tracing::warn!(key = %key, error = %e, "failed to record package access");
        }
    });
}
