//! Liveness endpoint.

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn ping() -> impl IntoResponse {
    Json(json!({"message": "pong"}))
}
