//! Postgres-backed [`PackageStats`] implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{PackageRow, PackageStats};
use crate::error::Result;

pub struct PgPackageStats {
    pool: PgPool,
}

impl PgPackageStats {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackageStats for PgPackageStats {
    async fn record_access(&self, name: &str, hit: bool) -> Result<()> {
        let (hit_inc, miss_inc): (i64, i64) = if hit { (1, 0) } else { (0, 1) };
        sqlx::query(
            r#"
            INSERT INTO packages (name, cache_hit, cache_miss)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET
                cache_hit = packages.cache_hit + EXCLUDED.cache_hit,
                cache_miss = packages.cache_miss + EXCLUDED.cache_miss,
                updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(hit_inc)
        .bind(miss_inc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_paginated(&self, page: i64, page_size: i64) -> Result<(Vec<PackageRow>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM packages")
            .fetch_one(&self.pool)
            .await?;

        let offset = (page.max(1) - 1) * page_size;
        let rows = sqlx::query_as::<_, PackageRow>(
            r#"
            SELECT id, name, cache_hit, cache_miss, created_at, updated_at
            FROM packages
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn list_by_name_paginated(
        &self,
        filter: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<PackageRow>, i64)> {
        let pattern = format!("%{filter}%");

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM packages WHERE name ILIKE $1")
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        let offset = (page.max(1) - 1) * page_size;
        let rows = sqlx::query_as::<_, PackageRow>(
            r#"
            SELECT id, name, cache_hit, cache_miss, created_at, updated_at
            FROM packages
            WHERE name ILIKE $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&pattern)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn delete_by_names(&self, names: &[String]) -> Result<()> {
        sqlx::query("DELETE FROM packages WHERE name = ANY($1)")
            .bind(names)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn total_served(&self) -> Result<i64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(cache_hit + cache_miss), 0)::BIGINT FROM packages")
                .fetch_one(&self.pool)
                .await?;
        Ok(total)
    }

    async fn truncate_and_reset_ids(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE packages RESTART IDENTITY")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create(&self, name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO packages (name, cache_hit, cache_miss)
            VALUES ($1, 0, 0)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
