//! Route definitions and request dispatch.
//!
//! Fixed routes serve the operator endpoints; everything else lands in the
//! fallback classifier, which sends artifact GETs to the caching pipeline
//! and forwards the rest to the transparent proxy. Classification looks
//! only at method and path.

use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::services::ServeDir;

use super::handlers;
use super::proxy;
use super::SharedState;
use crate::cache::pipeline;

/// Create the main router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping::ping))
        .route("/dashboard", get(handlers::dashboard::dashboard))
        .route("/purge", post(handlers::purge::purge))
        // Non-POST gets a JSON method-not-allowed body, so the route
        // accepts any method and checks inside.
        .route("/refresh-db", any(handlers::refresh::refresh))
        .nest_service("/static", ServeDir::new("static"))
        .fallback(dispatch)
        .with_state(state)
}

/// First-match dispatch for everything without a fixed route.
async fn dispatch(State(state): State<SharedState>, req: Request) -> Response {
    let path = req.uri().path().to_string();

    if req.method() == Method::GET && state.ecosystem.is_artifact(&path) {
        match pipeline::fetch_artifact(&state, &path).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    } else {
        match proxy::forward(&state, req).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
}
