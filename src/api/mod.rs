//! API module - HTTP handlers, dispatch and shared state.

pub mod handlers;
pub mod proxy;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, DownloadLocks};
use crate::config::Config;
use crate::ecosystem::Ecosystem;
use crate::stats::sampler::SharedSnapshot;
use crate::stats::PackageStats;
use self::handlers::refresh::RefreshState;

/// Connect timeout for upstream requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub ecosystem: Ecosystem,
    /// Resolved upstream origin (config override or ecosystem default).
    pub upstream: String,
    pub store: CacheStore,
    pub locks: DownloadLocks,
    pub stats: Arc<dyn PackageStats>,
    pub snapshot: SharedSnapshot,
    pub refresh: RefreshState,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Config,
        ecosystem: Ecosystem,
        store: CacheStore,
        stats: Arc<dyn PackageStats>,
        snapshot: SharedSnapshot,
    ) -> Self {
        let upstream = config
            .upstream
            .clone()
            .unwrap_or_else(|| ecosystem.default_upstream().to_string());

        // Redirects are followed (RubyGems bounces gem downloads to S3);
        // reqwest already drops Authorization when a redirect changes host.
        let client = reqwest::Client::builder()
            .user_agent(concat!("registry-cache/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("failed to build HTTP client");

        Self {
            config,
            ecosystem,
            upstream,
            store,
            locks: DownloadLocks::new(),
            stats,
            snapshot,
            refresh: RefreshState::new(),
            client,
        }
    }
}

pub type SharedState = Arc<AppState>;
