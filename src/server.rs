//! Shared server bootstrap for the three ecosystem frontends.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{routes, AppState};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::db;
use crate::ecosystem::Ecosystem;
use crate::error::Result;
use crate::stats::sampler::{self, SAMPLE_INTERVAL};
use crate::stats::{PackageStats, PgPackageStats};

/// Run one ecosystem frontend until the process is stopped.
pub async fn run(ecosystem: Ecosystem) -> Result<()> {
    let config = Config::from_env()?;
    tracing::info!(ecosystem = ecosystem.name(), "starting registry cache");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations complete");

    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(|| ecosystem.default_cache_dir().to_string());
    let store = CacheStore::new(&cache_dir);
    store.ensure_root().await?;

    let stats: Arc<dyn PackageStats> = Arc::new(PgPackageStats::new(pool));
    let snapshot = sampler::spawn(store.clone(), stats.clone(), SAMPLE_INTERVAL).await;

    let state = Arc::new(AppState::new(
        config.clone(),
        ecosystem,
        store,
        stats,
        snapshot,
    ));

    let app = routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address().parse()?;
    tracing::info!(
        ecosystem = ecosystem.name(),
        cache_dir = %cache_dir,
        "listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
