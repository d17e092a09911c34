//! Project snapshot repository

use crate::db::connection::DatabasePool;
use crate::db::models::{ProjectSnapshot, SnapshotDoc, SnapshotPage};

/// Repository for project snapshots and their embedded payloads
pub struct SnapshotRepository;

impl SnapshotRepository {
    /// Insert a snapshot row
    pub async fn create(
        pool: &DatabasePool,
        snapshot: &ProjectSnapshot,
    ) -> Result<ProjectSnapshot, sqlx::Error> {
        sqlx::query_as::<_, ProjectSnapshot>(
            "INSERT INTO project_snapshots (id, session_id, snapshot_number, label, source,
                                            is_pinned, is_released, released_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&snapshot.id)
        .bind(&snapshot.session_id)
        .bind(snapshot.snapshot_number)
        .bind(&snapshot.label)
        .bind(&snapshot.source)
        .bind(snapshot.is_pinned)
        .bind(snapshot.is_released)
        .bind(&snapshot.released_at)
        .bind(&snapshot.created_at)
        .fetch_one(pool)
        .await
    }

    /// Insert the captured doc payload
    pub async fn create_doc(pool: &DatabasePool, doc: &SnapshotDoc) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO project_snapshot_docs (snapshot_id, content, structured, global_style,
                                                design_direction, product_doc_version)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&doc.snapshot_id)
        .bind(&doc.content)
        .bind(&doc.structured)
        .bind(&doc.global_style)
        .bind(&doc.design_direction)
        .bind(doc.product_doc_version)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Insert one captured page payload
    pub async fn create_page(
        pool: &DatabasePool,
        snapshot_id: &str,
        page_id: &str,
        slug: &str,
        title: &str,
        order_index: i64,
        rendered_html: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO project_snapshot_pages (snapshot_id, page_id, slug, title, order_index,
                                                 rendered_html)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(snapshot_id)
        .bind(page_id)
        .bind(slug)
        .bind(title)
        .bind(order_index)
        .bind(rendered_html)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Get a snapshot by id
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<ProjectSnapshot>, sqlx::Error> {
        sqlx::query_as::<_, ProjectSnapshot>("SELECT * FROM project_snapshots WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Snapshots of a session, newest first
    pub async fn list_by_session(
        pool: &DatabasePool,
        session_id: &str,
        include_released: bool,
    ) -> Result<Vec<ProjectSnapshot>, sqlx::Error> {
        let sql = if include_released {
            "SELECT * FROM project_snapshots WHERE session_id = ? ORDER BY created_at DESC, snapshot_number DESC"
        } else {
            "SELECT * FROM project_snapshots WHERE session_id = ? AND is_released = 0
             ORDER BY created_at DESC, snapshot_number DESC"
        };
        sqlx::query_as::<_, ProjectSnapshot>(sql)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// Highest snapshot number for a session, when any
    pub async fn max_snapshot_number(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT MAX(snapshot_number) FROM project_snapshots WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(pool)
        .await
    }

    /// Latest auto-source snapshot for a session, when any
    pub async fn latest_auto(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Option<ProjectSnapshot>, sqlx::Error> {
        sqlx::query_as::<_, ProjectSnapshot>(
            "SELECT * FROM project_snapshots WHERE session_id = ? AND source = 'auto'
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(pool)
        .await
    }

    /// Persist pin/release bookkeeping of a snapshot row
    pub async fn update_flags(
        pool: &DatabasePool,
        snapshot: &ProjectSnapshot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE project_snapshots SET is_pinned = ?, is_released = ?, released_at = ?
             WHERE id = ?",
        )
        .bind(snapshot.is_pinned)
        .bind(snapshot.is_released)
        .bind(&snapshot.released_at)
        .bind(&snapshot.id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Null the payload columns of a released snapshot
    pub async fn prune_payload(pool: &DatabasePool, snapshot_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE project_snapshot_docs
             SET content = NULL, structured = NULL, global_style = NULL, design_direction = NULL
             WHERE snapshot_id = ?",
        )
        .bind(snapshot_id)
        .execute(pool)
        .await?;
        sqlx::query("UPDATE project_snapshot_pages SET rendered_html = NULL WHERE snapshot_id = ?")
            .bind(snapshot_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Get the captured doc of a snapshot
    pub async fn get_doc(
        pool: &DatabasePool,
        snapshot_id: &str,
    ) -> Result<Option<SnapshotDoc>, sqlx::Error> {
        sqlx::query_as::<_, SnapshotDoc>(
            "SELECT * FROM project_snapshot_docs WHERE snapshot_id = ?",
        )
        .bind(snapshot_id)
        .fetch_optional(pool)
        .await
    }

    /// Captured pages of a snapshot in display order
    pub async fn list_pages(
        pool: &DatabasePool,
        snapshot_id: &str,
    ) -> Result<Vec<SnapshotPage>, sqlx::Error> {
        sqlx::query_as::<_, SnapshotPage>(
            "SELECT * FROM project_snapshot_pages WHERE snapshot_id = ? ORDER BY order_index ASC",
        )
        .bind(snapshot_id)
        .fetch_all(pool)
        .await
    }
}
