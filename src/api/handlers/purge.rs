//! Cache purge endpoint.
//!
//! Each requested name is treated as a shell-style wildcard pattern rooted
//! at the cache directory; matching files are unlinked, then the named
//! rows are removed from the stats store.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::SharedState;

#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    pub packages: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<String>>,
}

impl PurgeResponse {
    fn plain(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
            deleted: None,
            failed: None,
        }
    }
}

pub async fn purge(State(state): State<SharedState>, body: Bytes) -> Response {
    let request: PurgeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "invalid purge request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(PurgeResponse::plain(false, "Invalid request body")),
            )
                .into_response();
        }
    };

    if request.packages.is_empty() {
        return Json(PurgeResponse::plain(true, "No packages to purge")).into_response();
    }

    let mut files_removed = 0usize;
    let mut failed: Vec<String> = Vec::new();
    for pattern in &request.packages {
        match state.store.purge_matching(pattern).await {
            Ok(files) => files_removed += files.len(),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "failed to purge cache files");
                failed.push(pattern.clone());
            }
        }
    }

    if let Err(e) = state.stats.delete_by_names(&request.packages).await {
        tracing::error!(error = %e, "failed to delete packages from database");
        return Json(PurgeResponse::plain(
            false,
            "Failed to delete packages from database",
        ))
        .into_response();
    }

    tracing::info!(
        requested = request.packages.len(),
        files_removed,
        "purged packages"
    );

    let mut response = PurgeResponse {
        success: true,
        message: "Packages purged successfully".into(),
        deleted: Some(request.packages),
        failed: None,
    };
    if !failed.is_empty() {
        response.message = "Some packages failed to purge completely".into();
        response.failed = Some(failed);
    }
    Json(response).into_response()
}
