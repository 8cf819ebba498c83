//! Per-artifact hit/miss statistics.
//!
//! The metadata store is an external collaborator reached through the
//! [`PackageStats`] trait; the dashboard and operator endpoints are its
//! only consumers. It is never authoritative for cache state.

pub mod memory;
pub mod postgres;
pub mod sampler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

pub use self::memory::InMemoryPackageStats;
pub use self::postgres::PgPackageStats;

/// One row per cache key ever observed.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PackageRow {
    pub id: i64,
    pub name: String,
    pub cache_hit: i64,
    pub cache_miss: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent per-artifact counters.
#[async_trait]
pub trait PackageStats: Send + Sync {
    /// Upsert by name, incrementing the hit or miss counter.
    async fn record_access(&self, name: &str, hit: bool) -> Result<()>;

    /// Page of rows ordered by id, plus the total row count.
    async fn list_paginated(&self, page: i64, page_size: i64) -> Result<(Vec<PackageRow>, i64)>;

    /// Page of rows whose name contains `filter` (case-insensitive),
    /// ordered by id, plus the total matching count.
    async fn list_by_name_paginated(
        &self,
        filter: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<PackageRow>, i64)>;

    /// Delete every row whose name is in `names`.
    async fn delete_by_names(&self, names: &[String]) -> Result<()>;

    /// Sum of `cache_hit + cache_miss` across all rows.
    async fn total_served(&self) -> Result<i64>;

    /// Empty the table and reset the identity sequence.
    async fn truncate_and_reset_ids(&self) -> Result<()>;

    /// Insert a fresh zero-counter row (used by the refresh rebuild).
    async fn create(&self, name: &str) -> Result<()>;
}
