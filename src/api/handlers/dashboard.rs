//! Operator dashboard.
//!
//! One HTML page: aggregate cache statistics, a name filter, and a
//! 20-row table of per-package hit/miss counters ordered by row id.

use axum::extract::{Query, State};
use axum::response::Html;
use serde::Deserialize;

use crate::api::SharedState;
use crate::error::Result;
use crate::stats::sampler::{format_bytes, CacheSnapshot};
use crate::stats::PackageRow;

pub const PAGE_SIZE: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub page: Option<i64>,
    pub filter: Option<String>,
}

pub async fn dashboard(
    State(state): State<SharedState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Html<String>> {
    let page = query.page.filter(|p| *p > 0).unwrap_or(1);
    let filter = query.filter.unwrap_or_default();

    let (rows, total) = if filter.is_empty() {
        state.stats.list_paginated(page, PAGE_SIZE).await?
    } else {
        state
            .stats
            .list_by_name_paginated(&filter, page, PAGE_SIZE)
            .await?
    };

    let snapshot = state.snapshot.read().await.clone();
    let total_pages = (total + PAGE_SIZE - 1) / PAGE_SIZE;

    Ok(Html(render(
        state.ecosystem.dashboard_title(),
        &rows,
        page,
        total_pages,
        &filter,
        &snapshot,
    )))
}

fn render(
    title: &str,
    rows: &[PackageRow],
    page: i64,
    total_pages: i64,
    filter: &str,
    snapshot: &CacheSnapshot,
) -> String {
    let last_updated = snapshot
        .last_updated
        .map(|t| t.format("%b %d, %Y %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "N/A".into());

    let mut table_rows = String::new();
    for row in rows {
        table_rows.push_str(&format!(
            "      <tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&row.name),
            row.cache_hit,
            row.cache_miss
        ));
    }

    let mut pagination = String::new();
    if page > 1 {
        pagination.push_str(&format!(
            "      <a class=\"page-link\" href=\"?page={}&filter={}\">Previous</a>\n",
            page - 1,
            escape_html(filter)
        ));
    }
    pagination.push_str(&format!(
        "      <span class=\"page-current\">Page {page} of {}</span>\n",
        total_pages.max(1)
    ));
    if page < total_pages {
        pagination.push_str(&format!(
            "      <a class=\"page-link\" href=\"?page={}&filter={}\">Next</a>\n",
            page + 1,
            escape_html(filter)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <link rel="stylesheet" href="/static/dashboard.css">
</head>
<body>
<div class="container">
  <div class="header">
    <img src="/static/logo.svg" alt="logo">
    <h1>{title}</h1>
  </div>

  <div class="stats-row">
    <div class="stats-card"><div class="stats-subtitle">Files in Cache</div><div class="stats-value">{file_count}</div></div>
    <div class="stats-card"><div class="stats-subtitle">Total Cache Size</div><div class="stats-value">{cache_size}</div></div>
    <div class="stats-card"><div class="stats-subtitle">Total Downloads</div><div class="stats-value">{served}</div></div>
  </div>
  <p class="stats-updated">Statistics updated: {last_updated}</p>

  <form method="get" action="/dashboard">
    <input type="text" name="filter" placeholder="Filter by package name" value="{filter_value}">
    <button type="submit">Filter</button>
  </form>

  <table>
    <thead><tr><th>Name</th><th>Cache Hit</th><th>Cache Miss</th></tr></thead>
    <tbody>
{table_rows}    </tbody>
  </table>

  <nav class="pagination">
{pagination}  </nav>
</div>
</body>
</html>"#,
        title = escape_html(title),
        file_count = snapshot.file_count,
        cache_size = format_bytes(snapshot.total_bytes),
        served = snapshot.packages_served,
        last_updated = last_updated,
        filter_value = escape_html(filter),
        table_rows = table_rows,
        pagination = pagination,
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_row(id: i64, name: &str, hit: i64, miss: i64) -> PackageRow {
        PackageRow {
            id,
            name: name.into(),
            cache_hit: hit,
            cache_miss: miss,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_contains_rows_and_stats() {
        let snapshot = CacheSnapshot {
            file_count: 2,
            total_bytes: 2048,
            packages_served: 7,
            last_updated: Some(Utc::now()),
        };
        let rows = vec![
            sample_row(1, "lodash-4.17.21.tgz", 3, 1),
            sample_row(2, "rails-7.1.0.gem", 0, 1),
        ];
        let html = render("Registry Cache for NPM", &rows, 1, 1, "", &snapshot);

        assert!(html.contains("Registry Cache for NPM"));
        assert!(html.contains("lodash-4.17.21.tgz"));
        assert!(html.contains("rails-7.1.0.gem"));
        assert!(html.contains("2.00 KB"));
        assert!(html.contains("Page 1 of 1"));
        assert!(!html.contains("Previous"));
        assert!(!html.contains("Next"));
    }

    #[test]
    fn test_render_pagination_links() {
        let snapshot = CacheSnapshot::default();
        let html = render("t", &[], 2, 3, "rails", &snapshot);
        assert!(html.contains("?page=1&filter=rails"));
        assert!(html.contains("?page=3&filter=rails"));
        assert!(html.contains("Page 2 of 3"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>\"&\""),
            "&lt;script&gt;&quot;&amp;&quot;"
        );
    }
}
