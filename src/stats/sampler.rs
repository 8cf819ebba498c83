//! Background aggregate statistics sampler.
//!
//! Periodically walks the cache directory and queries the stats store,
//! publishing the result into a shared snapshot. Readers (the dashboard)
//! take the read side of the lock and copy the snapshot; figures may lag
//! live state by up to one interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::PackageStats;
use crate::cache::CacheStore;

/// Default refresh interval.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Aggregate cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub file_count: u64,
    pub total_bytes: u64,
    pub packages_served: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

pub type SharedSnapshot = Arc<RwLock<CacheSnapshot>>;

/// Compute a fresh snapshot from the cache directory and the stats store.
pub async fn sample(store: &CacheStore, stats: &dyn PackageStats) -> CacheSnapshot {
    let (file_count, total_bytes) = match store.list_files().await {
        Ok(files) => (
            files.len() as u64,
            files.iter().map(|(_, size)| size).sum(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "failed to scan cache directory");
            (0, 0)
        }
    };

    let packages_served = match stats.total_served().await {
        Ok(total) => total,
        Err(e) => {
            tracing::warn!(error = %e, "failed to query total packages served");
            0
        }
    };

    CacheSnapshot {
        file_count,
        total_bytes,
        packages_served,
        last_updated: Some(Utc::now()),
    }
}

/// Take an initial sample, then refresh on `interval` in a background task.
pub async fn spawn(
    store: CacheStore,
    stats: Arc<dyn PackageStats>,
    interval: Duration,
) -> SharedSnapshot {
    let snapshot = Arc::new(RwLock::new(sample(&store, stats.as_ref()).await));

    let shared = snapshot.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick duplicates the initial sample
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let fresh = sample(&store, stats.as_ref()).await;
            tracing::debug!(
                files = fresh.file_count,
                bytes = fresh.total_bytes,
                served = fresh.packages_served,
                "cache stats updated"
            );
            *shared.write().await = fresh;
        }
    });

    snapshot
}

/// Human-readable 1024-base size.
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let (mut div, mut exp) = (UNIT, 0usize);
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let units = ["KB", "MB", "GB", "TB", "PB"];
    format!("{:.2} {}", bytes as f64 / div as f64, units[exp.min(units.len() - 1)])
}
