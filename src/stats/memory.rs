//! In-memory [`PackageStats`] implementation.
//!
//! Backs the integration tests and DB-less local runs. Mirrors the
//! Postgres semantics: upsert on access, id-ordered listings, truncate
//! resets the id sequence.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{PackageRow, PackageStats};
use crate::error::Result;

#[derive(Default)]
struct Table {
    next_id: i64,
    // name → row, insertion order reconstructed from ids on listing
    rows: BTreeMap<String, PackageRow>,
}

#[derive(Default)]
pub struct InMemoryPackageStats {
    table: Mutex<Table>,
}

impl InMemoryPackageStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_rows(table: &Table) -> Vec<PackageRow> {
        let mut rows: Vec<PackageRow> = table.rows.values().cloned().collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    fn paginate(rows: Vec<PackageRow>, page: i64, page_size: i64) -> (Vec<PackageRow>, i64) {
        let total = rows.len() as i64;
        let offset = ((page.max(1) - 1) * page_size) as usize;
        let page_rows = rows
            .into_iter()
            .skip(offset)
            .take(page_size.max(0) as usize)
            .collect();
        (page_rows, total)
    }

    /// Snapshot of a single row, if present.
    pub fn get(&self, name: &str) -> Option<PackageRow> {
        self.table.lock().unwrap().rows.get(name).cloned()
    }
}

#[async_trait]
impl PackageStats for InMemoryPackageStats {
    async fn record_access(&self, name: &str, hit: bool) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        let now = Utc::now();
        if let Some(row) = table.rows.get_mut(name) {
            if hit {
                row.cache_hit += 1;
            } else {
                row.cache_miss += 1;
            }
            row.updated_at = now;
        } else {
            table.next_id += 1;
            let id = table.next_id;
            table.rows.insert(
                name.to_string(),
                PackageRow {
                    id,
                    name: name.to_string(),
                    cache_hit: i64::from(hit),
                    cache_miss: i64::from(!hit),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn list_paginated(&self, page: i64, page_size: i64) -> Result<(Vec<PackageRow>, i64)> {
        let table = self.table.lock().unwrap();
        Ok(Self::paginate(Self::sorted_rows(&table), page, page_size))
    }

    async fn list_by_name_paginated(
        &self,
        filter: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<PackageRow>, i64)> {
        let table = self.table.lock().unwrap();
        let needle = filter.to_lowercase();
        let rows = Self::sorted_rows(&table)
            .into_iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .collect();
        Ok(Self::paginate(rows, page, page_size))
    }

    async fn delete_by_names(&self, names: &[String]) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        for name in names {
            table.rows.remove(name);
        }
        Ok(())
    }

    async fn total_served(&self) -> Result<i64> {
        let table = self.table.lock().unwrap();
        Ok(table
            .rows
            .values()
            .map(|r| r.cache_hit + r.cache_miss)
            .sum())
    }

    async fn truncate_and_reset_ids(&self) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        table.rows.clear();
        table.next_id = 0;
        Ok(())
    }

    async fn create(&self, name: &str) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        if table.rows.contains_key(name) {
            return Ok(());
        }
        table.next_id += 1;
        let id = table.next_id;
        let now = Utc::now();
        table.rows.insert(
            name.to_string(),
            PackageRow {
                id,
                name: name.to_string(),
                cache_hit: 0,
                cache_miss: 0,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }
}
