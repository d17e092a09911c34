//! Product doc and history repository

use crate::db::connection::DatabasePool;
use crate::db::models::{now_rfc3339, ProductDoc, ProductDocHistory};

/// Repository for product docs and their version histories
pub struct ProductDocRepository;

impl ProductDocRepository {
    /// Insert a product doc row
    pub async fn create(pool: &DatabasePool, doc: &ProductDoc) -> Result<ProductDoc, sqlx::Error> {
        sqlx::query_as::<_, ProductDoc>(
            "INSERT INTO product_docs (id, session_id, content, structured, version, status,
                                       pending_regeneration_pages, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&doc.id)
        .bind(&doc.session_id)
        .bind(&doc.content)
        .bind(&doc.structured)
        .bind(doc.version)
        .bind(&doc.status)
        .bind(&doc.pending_regeneration_pages)
        .bind(&doc.created_at)
        .bind(&doc.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a doc by id
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<ProductDoc>, sqlx::Error> {
        sqlx::query_as::<_, ProductDoc>("SELECT * FROM product_docs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Get the (single) doc of a session
    pub async fn get_by_session(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Option<ProductDoc>, sqlx::Error> {
        sqlx::query_as::<_, ProductDoc>("SELECT * FROM product_docs WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(pool)
            .await
    }

    /// Persist every mutable column of a doc row
    pub async fn update(pool: &DatabasePool, doc: &ProductDoc) -> Result<ProductDoc, sqlx::Error> {
        sqlx::query_as::<_, ProductDoc>(
            "UPDATE product_docs SET content = ?, structured = ?, version = ?, status = ?,
                                     pending_regeneration_pages = ?, updated_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(&doc.content)
        .bind(&doc.structured)
        .bind(doc.version)
        .bind(&doc.status)
        .bind(&doc.pending_regeneration_pages)
        .bind(now_rfc3339())
        .bind(&doc.id)
        .fetch_one(pool)
        .await
    }

    /// Insert a history row
    pub async fn create_history(
        pool: &DatabasePool,
        history: &ProductDocHistory,
    ) -> Result<ProductDocHistory, sqlx::Error> {
        sqlx::query_as::<_, ProductDocHistory>(
            "INSERT INTO product_doc_histories (product_doc_id, version, content, structured,
                                                change_summary, source, is_pinned, is_released,
                                                released_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&history.product_doc_id)
        .bind(history.version)
        .bind(&history.content)
        .bind(&history.structured)
        .bind(&history.change_summary)
        .bind(&history.source)
        .bind(history.is_pinned)
        .bind(history.is_released)
        .bind(&history.released_at)
        .bind(&history.created_at)
        .fetch_one(pool)
        .await
    }

    /// Get a history row by id
    pub async fn get_history(
        pool: &DatabasePool,
        history_id: i64,
    ) -> Result<Option<ProductDocHistory>, sqlx::Error> {
        sqlx::query_as::<_, ProductDocHistory>(
            "SELECT * FROM product_doc_histories WHERE id = ?",
        )
        .bind(history_id)
        .fetch_optional(pool)
        .await
    }

    /// List histories of a doc, highest version first
    ///
    /// # Arguments
    /// * `include_released` - when false, released rows are filtered out
    pub async fn list_histories(
        pool: &DatabasePool,
        product_doc_id: &str,
        include_released: bool,
    ) -> Result<Vec<ProductDocHistory>, sqlx::Error> {
        let sql = if include_released {
            "SELECT * FROM product_doc_histories WHERE product_doc_id = ?
             ORDER BY version DESC"
        } else {
            "SELECT * FROM product_doc_histories WHERE product_doc_id = ? AND is_released = 0
             ORDER BY version DESC"
        };
        sqlx::query_as::<_, ProductDocHistory>(sql)
            .bind(product_doc_id)
            .fetch_all(pool)
            .await
    }

    /// Highest history version for a doc, when any
    pub async fn max_history_version(
        pool: &DatabasePool,
        product_doc_id: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT MAX(version) FROM product_doc_histories WHERE product_doc_id = ?",
        )
        .bind(product_doc_id)
        .fetch_one(pool)
        .await
    }

    /// Persist pin/release bookkeeping of a history row
    pub async fn update_history_flags(
        pool: &DatabasePool,
        history: &ProductDocHistory,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE product_doc_histories
             SET is_pinned = ?, is_released = ?, released_at = ?, content = ?, structured = ?
             WHERE id = ?",
        )
        .bind(history.is_pinned)
        .bind(history.is_released)
        .bind(&history.released_at)
        .bind(&history.content)
        .bind(&history.structured)
        .bind(history.id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
