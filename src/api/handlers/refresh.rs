//! Stats table rebuild endpoint.
//!
//! Truncates the stats table and re-inserts one zero-counter row per file
//! in the cache directory. The rebuild runs in the background; the request
//! returns immediately. At most one rebuild runs at a time, and a new one
//! may not start until thirty minutes after the previous one began. The
//! rate-limit state lives in process memory only.

use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::Method;
use axum::Json;
use serde::Serialize;

use crate::api::{AppState, SharedState};
use crate::error::Result;

/// Minimum wait between refresh starts.
pub const REFRESH_MIN_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default)]
struct RefreshInner {
    in_progress: bool,
    last_started: Option<Instant>,
}

/// Shared refresh rate-limit state.
#[derive(Debug, Default)]
pub struct RefreshState {
    inner: StdMutex<RefreshInner>,
}

impl RefreshState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a refresh as started, or explain why it cannot start.
    pub fn try_begin(&self) -> std::result::Result<(), String> {
        let mut inner = self.inner.lock().expect("refresh state poisoned");

        if inner.in_progress {
            return Err("A refresh operation is already in progress. Please wait.".into());
        }

        if let Some(last) = inner.last_started {
            let elapsed = last.elapsed();
            if elapsed < REFRESH_MIN_INTERVAL {
                let remaining = REFRESH_MIN_INTERVAL - elapsed;
                let minutes = (remaining.as_secs() + 59) / 60;
                return Err(format!(
                    "Please wait {minutes} minute(s) before refreshing again."
                ));
            }
        }

        inner.in_progress = true;
        inner.last_started = Some(Instant::now());
        Ok(())
    }

    pub fn finish(&self) {
        self.inner.lock().expect("refresh state poisoned").in_progress = false;
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
}

pub async fn refresh(State(state): State<SharedState>, method: Method) -> Json<RefreshResponse> {
    if method != Method::POST {
        return Json(RefreshResponse {
            success: false,
            message: "Method not allowed".into(),
        });
    }

    if let Err(message) = state.refresh.try_begin() {
        return Json(RefreshResponse {
            success: false,
            message,
        });
    }

    let background = state.clone();
    tokio::spawn(async move {
        match rebuild(&background).await {
            Ok(count) => {
                tracing::info!(packages = count, "database refresh completed");
            }
            Err(e) => {
                tracing::error!(error = %e, "database refresh failed");
            }
        }
        background.refresh.finish();
    });

    Json(RefreshResponse {
        success: true,
        message: "Database refresh started in background. This may take a few minutes.".into(),
    })
}

/// Truncate the table and insert one zero-counter row per cached file.
async fn rebuild(state: &AppState) -> Result<usize> {
    tracing::info!("starting database refresh");
    state.stats.truncate_and_reset_ids().await?;

    let files = state.store.list_files().await?;
    let mut count = 0usize;
    for (name, _size) in files {
        if let Err(e) = state.stats.create(&name).await {
            tracing::warn!(file = %name, error = %e, "failed to insert package row");
            continue;
        }
        count += 1;
        if count % 100 == 0 {
            tracing::info!(processed = count, "refresh in progress");
        }
    }
    Ok(count)
}
