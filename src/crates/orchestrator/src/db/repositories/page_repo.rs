//! Page and page-version repository

use crate::db::connection::DatabasePool;
use crate::db::models::{now_rfc3339, Page, PageVersion};
use std::collections::HashMap;

/// Repository for pages and their versions
pub struct PageRepository;

impl PageRepository {
    /// Insert a page row
    pub async fn create(pool: &DatabasePool, page: &Page) -> Result<Page, sqlx::Error> {
        sqlx::query_as::<_, Page>(
            "INSERT INTO pages (id, session_id, title, slug, description, order_index,
                                current_version_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&page.id)
        .bind(&page.session_id)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.description)
        .bind(page.order_index)
        .bind(page.current_version_id)
        .bind(&page.created_at)
        .bind(&page.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a page by id
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Page>, sqlx::Error> {
        sqlx::query_as::<_, Page>("SELECT * FROM pages WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Get a page by session and slug
    pub async fn get_by_slug(
        pool: &DatabasePool,
        session_id: &str,
        slug: &str,
    ) -> Result<Option<Page>, sqlx::Error> {
        sqlx::query_as::<_, Page>("SELECT * FROM pages WHERE session_id = ? AND slug = ?")
            .bind(session_id)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    /// Pages of a session in display order
    pub async fn list_by_session(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Vec<Page>, sqlx::Error> {
        sqlx::query_as::<_, Page>(
            "SELECT * FROM pages WHERE session_id = ?
             ORDER BY order_index ASC, created_at ASC",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
    }

    /// Persist every mutable column of a page row
    pub async fn update(pool: &DatabasePool, page: &Page) -> Result<Page, sqlx::Error> {
        sqlx::query_as::<_, Page>(
            "UPDATE pages SET title = ?, slug = ?, description = ?, order_index = ?,
                              current_version_id = ?, updated_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(&page.title)
        .bind(&page.slug)
        .bind(&page.description)
        .bind(page.order_index)
        .bind(page.current_version_id)
        .bind(now_rfc3339())
        .bind(&page.id)
        .fetch_one(pool)
        .await
    }

    /// Delete a page; versions cascade
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Insert a page version row
    pub async fn create_version(
        pool: &DatabasePool,
        version: &PageVersion,
    ) -> Result<PageVersion, sqlx::Error> {
        sqlx::query_as::<_, PageVersion>(
            "INSERT INTO page_versions (page_id, version, html, description, source, is_pinned,
                                        is_released, released_at, payload_pruned_at,
                                        fallback_used, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&version.page_id)
        .bind(version.version)
        .bind(&version.html)
        .bind(&version.description)
        .bind(&version.source)
        .bind(version.is_pinned)
        .bind(version.is_released)
        .bind(&version.released_at)
        .bind(&version.payload_pruned_at)
        .bind(version.fallback_used)
        .bind(&version.created_at)
        .fetch_one(pool)
        .await
    }

    /// Get a page version by id
    pub async fn get_version(
        pool: &DatabasePool,
        version_id: i64,
    ) -> Result<Option<PageVersion>, sqlx::Error> {
        sqlx::query_as::<_, PageVersion>("SELECT * FROM page_versions WHERE id = ?")
            .bind(version_id)
            .fetch_optional(pool)
            .await
    }

    /// Versions of a page, highest version first
    pub async fn list_versions(
        pool: &DatabasePool,
        page_id: &str,
        include_released: bool,
    ) -> Result<Vec<PageVersion>, sqlx::Error> {
        let sql = if include_released {
            "SELECT * FROM page_versions WHERE page_id = ? ORDER BY version DESC"
        } else {
            "SELECT * FROM page_versions WHERE page_id = ? AND is_released = 0
             ORDER BY version DESC"
        };
        sqlx::query_as::<_, PageVersion>(sql)
            .bind(page_id)
            .fetch_all(pool)
            .await
    }

    /// Highest version number for a page, when any
    pub async fn max_version(
        pool: &DatabasePool,
        page_id: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT MAX(version) FROM page_versions WHERE page_id = ?")
            .bind(page_id)
            .fetch_one(pool)
            .await
    }

    /// Persist pin/release bookkeeping of a version row
    pub async fn update_version_flags(
        pool: &DatabasePool,
        version: &PageVersion,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE page_versions
             SET is_pinned = ?, is_released = ?, released_at = ?, payload_pruned_at = ?, html = ?
             WHERE id = ?",
        )
        .bind(version.is_pinned)
        .bind(version.is_released)
        .bind(&version.released_at)
        .bind(&version.payload_pruned_at)
        .bind(&version.html)
        .bind(version.id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Resolve many version rows by id in one query
    ///
    /// Used by snapshot capture so one batch resolves every page's current
    /// HTML.
    pub async fn versions_by_ids(
        pool: &DatabasePool,
        ids: &[i64],
    ) -> Result<HashMap<i64, PageVersion>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT * FROM page_versions WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, PageVersion>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let versions = query.fetch_all(pool).await?;
        Ok(versions.into_iter().map(|v| (v.id, v)).collect())
    }
}
