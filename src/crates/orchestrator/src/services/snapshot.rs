//! Project snapshot service
//!
//! A snapshot is a value copy of the product doc plus the current rendered
//! HTML of every page, taken atomically. Snapshot numbers are unique and
//! monotonic per session; assignment takes MAX+1 inside the insert
//! transaction and retries up to 3 times when a concurrent writer wins the
//! number. Rollback replays a snapshot into the live doc and pages as fresh
//! versions and then records a rollback-source snapshot - concurrent writers
//! are not blocked, they simply produce newer versions afterwards.

use crate::db::models::{
    now_rfc3339, EventSource, Page, ProjectSnapshot, SnapshotDoc, SnapshotPage, VersionSource,
};
use crate::db::repositories::{
    PageRepository, ProductDocRepository, SessionRepository, SnapshotRepository,
};
use crate::db::DatabasePool;
use crate::events::{EventEmitter, EventType};
use crate::services::page::PageVersionService;
use crate::services::product_doc::{ProductDocService, MAX_AUTO, MAX_PINNED};
use crate::{OrchestratorError, Result};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const SNAPSHOT_NUMBER_RETRIES: usize = 3;

/// Service for project snapshots
#[derive(Clone)]
pub struct SnapshotService {
    pool: DatabasePool,
    emitter: Option<Arc<EventEmitter>>,
}

impl SnapshotService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            emitter: None,
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    async fn emit(&self, event_type: EventType, payload: serde_json::Value) {
        if let Some(emitter) = &self.emitter {
            emitter.emit_from(event_type, payload, EventSource::Session).await;
        }
    }

    /// Capture the current doc + pages as a new snapshot
    pub async fn create_snapshot(
        &self,
        session_id: &str,
        source: VersionSource,
        label: Option<&str>,
    ) -> Result<ProjectSnapshot> {
        if SessionRepository::get_by_id(&self.pool, session_id).await?.is_none() {
            return Err(OrchestratorError::NotFound("Session not found".to_string()));
        }
        let doc = ProductDocRepository::get_by_session(&self.pool, session_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("ProductDoc not found".to_string()))?;

        let pages = PageRepository::list_by_session(&self.pool, session_id).await?;
        let html_by_page = self.resolve_page_html(&pages).await?;

        let mut last_error: Option<OrchestratorError> = None;
        for _attempt in 0..SNAPSHOT_NUMBER_RETRIES {
            match self
                .create_snapshot_record(session_id, source, label, &doc, &pages, &html_by_page)
                .await
            {
                Ok(snapshot) => {
                    // Retention never fails the capture that triggered it.
                    if let Err(error) = self.apply_retention_policy(session_id).await {
                        tracing::error!(session_id, %error, "snapshot retention failed");
                    }
                    self.emit(
                        EventType::SnapshotCreated,
                        json!({
                            "snapshot_id": snapshot.id,
                            "snapshot_number": snapshot.snapshot_number,
                            "source": snapshot.source,
                        }),
                    )
                    .await;
                    return Ok(snapshot);
                }
                Err(error) if is_unique_violation(&error) => {
                    last_error = Some(error);
                    continue;
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            OrchestratorError::StateConflict("Failed to assign snapshot number".to_string())
        }))
    }

    /// Atomic insert of snapshot + doc payload + page payloads
    async fn create_snapshot_record(
        &self,
        session_id: &str,
        source: VersionSource,
        label: Option<&str>,
        doc: &crate::db::models::ProductDoc,
        pages: &[Page],
        html_by_page: &HashMap<String, String>,
    ) -> Result<ProjectSnapshot> {
        let mut tx = self.pool.begin().await?;

        let next_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(snapshot_number), 0) + 1 FROM project_snapshots
             WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        let snapshot_id = Uuid::new_v4().to_string();
        let snapshot = sqlx::query_as::<_, ProjectSnapshot>(
            "INSERT INTO project_snapshots (id, session_id, snapshot_number, label, source,
                                            is_pinned, is_released, released_at, created_at)
             VALUES (?, ?, ?, ?, ?, 0, 0, NULL, ?)
             RETURNING *",
        )
        .bind(&snapshot_id)
        .bind(session_id)
        .bind(next_number)
        .bind(label)
        .bind(source.as_str())
        .bind(now_rfc3339())
        .fetch_one(&mut *tx)
        .await?;

        let structured = doc.structured_value();
        let global_style = structured
            .get("global_style")
            .or_else(|| structured.get("globalStyle"))
            .filter(|value| value.is_object());
        let design_direction = structured
            .get("design_direction")
            .or_else(|| structured.get("designDirection"))
            .filter(|value| value.is_object());

        sqlx::query(
            "INSERT INTO project_snapshot_docs (snapshot_id, content, structured, global_style,
                                                design_direction, product_doc_version)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&snapshot_id)
        .bind(&doc.content)
        .bind(&doc.structured)
        .bind(global_style.map(|value| value.to_string()))
        .bind(design_direction.map(|value| value.to_string()))
        .bind(doc.version)
        .execute(&mut *tx)
        .await?;

        for page in pages {
            sqlx::query(
                "INSERT INTO project_snapshot_pages (snapshot_id, page_id, slug, title,
                                                     order_index, rendered_html)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&snapshot_id)
            .bind(&page.id)
            .bind(&page.slug)
            .bind(&page.title)
            .bind(page.order_index)
            .bind(html_by_page.get(&page.id).map(|html| html.as_str()).unwrap_or(""))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(snapshot)
    }

    /// Resolve current HTML for every page in bulk (one query per batch)
    async fn resolve_page_html(&self, pages: &[Page]) -> Result<HashMap<String, String>> {
        let mut html_by_page = HashMap::new();

        let current_ids: Vec<i64> = pages
            .iter()
            .filter_map(|page| page.current_version_id)
            .collect();
        let versions = PageRepository::versions_by_ids(&self.pool, &current_ids).await?;
        for page in pages {
            if let Some(version) = page
                .current_version_id
                .and_then(|version_id| versions.get(&version_id))
            {
                html_by_page.insert(page.id.clone(), version.html.clone().unwrap_or_default());
            }
        }

        // Pages without a resolvable current reference fall back to their
        // highest non-released version.
        for page in pages {
            if html_by_page.contains_key(&page.id) {
                continue;
            }
            let fallback = PageRepository::list_versions(&self.pool, &page.id, false).await?;
            if let Some(version) = fallback.into_iter().next() {
                html_by_page.insert(page.id.clone(), version.html.unwrap_or_default());
            }
        }
        Ok(html_by_page)
    }

    /// Snapshots of a session, newest first
    pub async fn get_snapshots(
        &self,
        session_id: &str,
        include_released: bool,
    ) -> Result<Vec<ProjectSnapshot>> {
        Ok(SnapshotRepository::list_by_session(&self.pool, session_id, include_released).await?)
    }

    /// Get a snapshot or fail with `NotFound`
    pub async fn get_snapshot(&self, snapshot_id: &str) -> Result<ProjectSnapshot> {
        SnapshotRepository::get_by_id(&self.pool, snapshot_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Snapshot not found".to_string()))
    }

    /// The captured doc and pages of a snapshot
    pub async fn get_snapshot_payload(
        &self,
        snapshot_id: &str,
    ) -> Result<(Option<SnapshotDoc>, Vec<SnapshotPage>)> {
        let doc = SnapshotRepository::get_doc(&self.pool, snapshot_id).await?;
        let pages = SnapshotRepository::list_pages(&self.pool, snapshot_id).await?;
        Ok((doc, pages))
    }

    /// Replay a snapshot into the live doc and pages
    ///
    /// Creates a rollback-source doc history and new page versions, then
    /// records a rollback-source snapshot of the restored state.
    pub async fn rollback_to_snapshot(
        &self,
        session_id: &str,
        snapshot_id: &str,
    ) -> Result<ProjectSnapshot> {
        let snapshot = self.get_snapshot(snapshot_id).await?;
        if snapshot.session_id != session_id {
            return Err(OrchestratorError::NotFound("Snapshot not found".to_string()));
        }
        if snapshot.is_released {
            return Err(OrchestratorError::StateConflict(
                "Snapshot content has been released".to_string(),
            ));
        }
        let (snapshot_doc, snapshot_pages) = self.get_snapshot_payload(snapshot_id).await?;
        let snapshot_doc = snapshot_doc.ok_or_else(|| {
            OrchestratorError::StateConflict("Snapshot content missing".to_string())
        })?;

        let mut doc = ProductDocRepository::get_by_session(&self.pool, session_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("ProductDoc not found".to_string()))?;

        doc.content = snapshot_doc.content.clone().unwrap_or_default();
        doc.structured = snapshot_doc
            .structured
            .clone()
            .unwrap_or_else(|| "{}".to_string());
        let doc = ProductDocRepository::update(&self.pool, &doc).await?;

        let doc_service = match &self.emitter {
            Some(emitter) => ProductDocService::new(self.pool.clone()).with_emitter(emitter.clone()),
            None => ProductDocService::new(self.pool.clone()),
        };
        doc_service
            .create_history(
                &doc.id,
                &doc.content,
                doc.structured_value(),
                VersionSource::Rollback,
                Some(&format!("Rollback to snapshot {}", snapshot.snapshot_number)),
            )
            .await?;

        let version_service = match &self.emitter {
            Some(emitter) => PageVersionService::new(self.pool.clone()).with_emitter(emitter.clone()),
            None => PageVersionService::new(self.pool.clone()),
        };
        for snap_page in &snapshot_pages {
            let Some(mut page) = PageRepository::get_by_id(&self.pool, &snap_page.page_id).await?
            else {
                continue;
            };
            page.title = snap_page.title.clone();
            page.slug = snap_page.slug.clone();
            page.order_index = snap_page.order_index;
            PageRepository::update(&self.pool, &page).await?;

            version_service
                .create_version(
                    &page.id,
                    snap_page.rendered_html.as_deref().unwrap_or(""),
                    VersionSource::Rollback,
                    Some(&format!("Rollback to snapshot {}", snapshot.snapshot_number)),
                )
                .await?;
        }

        self.create_snapshot(session_id, VersionSource::Rollback, None)
            .await
    }

    /// Pin a snapshot; at most 2 pinned per session
    pub async fn pin_snapshot(&self, snapshot_id: &str) -> Result<ProjectSnapshot> {
        let mut snapshot = self.get_snapshot(snapshot_id).await?;
        if snapshot.is_released {
            return Err(OrchestratorError::StateConflict(
                "Snapshot content has been released".to_string(),
            ));
        }
        if snapshot.is_pinned {
            return Ok(snapshot);
        }

        let pinned = self.pinned_snapshot_ids(&snapshot.session_id).await?;
        if pinned.len() >= MAX_PINNED {
            return Err(OrchestratorError::PinnedLimitExceeded {
                current_pinned: pinned,
            });
        }

        snapshot.is_pinned = true;
        SnapshotRepository::update_flags(&self.pool, &snapshot).await?;
        Ok(snapshot)
    }

    /// Unpin a snapshot and re-run retention
    pub async fn unpin_snapshot(&self, snapshot_id: &str) -> Result<ProjectSnapshot> {
        let mut snapshot = self.get_snapshot(snapshot_id).await?;
        if !snapshot.is_pinned {
            return Ok(snapshot);
        }
        snapshot.is_pinned = false;
        SnapshotRepository::update_flags(&self.pool, &snapshot).await?;
        self.apply_retention_policy(&snapshot.session_id).await?;
        self.get_snapshot(snapshot_id).await
    }

    /// Ids of currently pinned snapshots for a session
    pub async fn pinned_snapshot_ids(&self, session_id: &str) -> Result<Vec<String>> {
        Ok(self
            .get_snapshots(session_id, true)
            .await?
            .into_iter()
            .filter(|snapshot| snapshot.is_pinned)
            .map(|snapshot| snapshot.id)
            .collect())
    }

    /// Release everything beyond 2 pinned + 5 auto; returns released count
    pub async fn apply_retention_policy(&self, session_id: &str) -> Result<usize> {
        let snapshots = SnapshotRepository::list_by_session(&self.pool, session_id, true).await?;

        let auto_keep: Vec<String> = snapshots
            .iter()
            .filter(|snapshot| VersionSource::parse(&snapshot.source) == Some(VersionSource::Auto))
            .take(MAX_AUTO)
            .map(|snapshot| snapshot.id.clone())
            .collect();
        let pinned_keep: Vec<String> = snapshots
            .iter()
            .filter(|snapshot| snapshot.is_pinned)
            .take(MAX_PINNED)
            .map(|snapshot| snapshot.id.clone())
            .collect();
        let keep_ids: std::collections::HashSet<String> =
            auto_keep.into_iter().chain(pinned_keep).collect();

        let mut released = 0;
        for mut snapshot in snapshots {
            if keep_ids.contains(&snapshot.id) {
                if snapshot.is_released {
                    snapshot.is_released = false;
                    snapshot.released_at = None;
                    SnapshotRepository::update_flags(&self.pool, &snapshot).await?;
                }
                continue;
            }
            if snapshot.is_released {
                continue;
            }
            snapshot.is_released = true;
            snapshot.released_at = Some(now_rfc3339());
            SnapshotRepository::update_flags(&self.pool, &snapshot).await?;
            SnapshotRepository::prune_payload(&self.pool, &snapshot.id).await?;
            released += 1;
        }
        Ok(released)
    }
}

fn is_unique_violation(error: &OrchestratorError) -> bool {
    match error {
        OrchestratorError::Database(db_error) => db_error
            .as_database_error()
            .map(|inner| inner.message().contains("UNIQUE constraint failed"))
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ProductDocStatus, Session};
    use crate::services::page::{NewPage, PageService};
    use crate::db::schema::test_pool;

    struct Fixture {
        snapshots: SnapshotService,
        versions: PageVersionService,
        docs: ProductDocService,
        page_id: String,
        doc_id: String,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();

        let docs = ProductDocService::new(pool.clone());
        let doc = docs
            .create(
                "s1",
                "# Landing",
                Some(json!({"global_style": {"font": "serif"}})),
                ProductDocStatus::Draft,
            )
            .await
            .unwrap();

        let pages = PageService::new(pool.clone());
        let page = pages
            .create_page(
                "s1",
                NewPage {
                    title: "Home".to_string(),
                    slug: "home".to_string(),
                    description: String::new(),
                    order_index: 0,
                },
            )
            .await
            .unwrap();

        let versions = PageVersionService::new(pool.clone());
        versions
            .create_version(&page.id, "<html>v1</html>", VersionSource::Auto, None)
            .await
            .unwrap();

        Fixture {
            snapshots: SnapshotService::new(pool),
            versions,
            docs,
            page_id: page.id,
            doc_id: doc.id,
        }
    }

    #[tokio::test]
    async fn test_snapshot_captures_doc_and_pages() {
        let fx = fixture().await;
        let snapshot = fx
            .snapshots
            .create_snapshot("s1", VersionSource::Manual, Some("first"))
            .await
            .unwrap();
        assert_eq!(snapshot.snapshot_number, 1);

        let (doc, pages) = fx.snapshots.get_snapshot_payload(&snapshot.id).await.unwrap();
        let doc = doc.unwrap();
        assert_eq!(doc.content.as_deref(), Some("# Landing"));
        assert!(doc.global_style.unwrap().contains("serif"));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].rendered_html.as_deref(), Some("<html>v1</html>"));
    }

    #[tokio::test]
    async fn test_snapshot_numbers_are_monotonic() {
        let fx = fixture().await;
        for expected in 1..=3 {
            let snapshot = fx
                .snapshots
                .create_snapshot("s1", VersionSource::Manual, None)
                .await
                .unwrap();
            assert_eq!(snapshot.snapshot_number, expected);
        }
    }

    #[tokio::test]
    async fn test_pin_limit_carries_current_ids() {
        let fx = fixture().await;
        let n1 = fx.snapshots.create_snapshot("s1", VersionSource::Manual, None).await.unwrap();
        let n2 = fx.snapshots.create_snapshot("s1", VersionSource::Manual, None).await.unwrap();
        let n3 = fx.snapshots.create_snapshot("s1", VersionSource::Manual, None).await.unwrap();

        fx.snapshots.pin_snapshot(&n1.id).await.unwrap();
        fx.snapshots.pin_snapshot(&n2.id).await.unwrap();

        let err = fx.snapshots.pin_snapshot(&n3.id).await.unwrap_err();
        match err {
            OrchestratorError::PinnedLimitExceeded { current_pinned } => {
                assert_eq!(current_pinned.len(), 2);
                assert!(current_pinned.contains(&n1.id));
                assert!(current_pinned.contains(&n2.id));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let third = fx.snapshots.get_snapshot(&n3.id).await.unwrap();
        assert!(!third.is_pinned);
    }

    #[tokio::test]
    async fn test_rollback_roundtrip() {
        let fx = fixture().await;
        let snapshot = fx
            .snapshots
            .create_snapshot("s1", VersionSource::Manual, None)
            .await
            .unwrap();

        // Mutate the live state past the snapshot.
        fx.docs
            .update(&fx.doc_id, Some("# Mutated"), None, None, None)
            .await
            .unwrap();
        fx.versions
            .create_version(&fx.page_id, "<html>v2</html>", VersionSource::Auto, None)
            .await
            .unwrap();

        let rollback = fx
            .snapshots
            .rollback_to_snapshot("s1", &snapshot.id)
            .await
            .unwrap();
        assert_eq!(rollback.source, "rollback");
        assert!(rollback.snapshot_number > snapshot.snapshot_number);

        let doc = fx.docs.get_doc(&fx.doc_id).await.unwrap();
        assert_eq!(doc.content, "# Landing");

        let current = fx.versions.get_current(&fx.page_id).await.unwrap().unwrap();
        assert_eq!(current.html.as_deref(), Some("<html>v1</html>"));
        assert_eq!(current.source, "rollback");

        let histories = fx.docs.get_history(&fx.doc_id, true).await.unwrap();
        assert!(histories.iter().any(|item| item.source == "rollback"));
    }

    #[tokio::test]
    async fn test_rollback_to_released_snapshot_fails() {
        let fx = fixture().await;
        let snapshot = fx
            .snapshots
            .create_snapshot("s1", VersionSource::Manual, None)
            .await
            .unwrap();
        // Manual snapshots are not in the auto-keep set, so enough newer
        // snapshots push the first one out.
        for _ in 0..6 {
            fx.snapshots
                .create_snapshot("s1", VersionSource::Auto, None)
                .await
                .unwrap();
        }

        let released = fx.snapshots.get_snapshot(&snapshot.id).await.unwrap();
        assert!(released.is_released);
        let err = fx
            .snapshots
            .rollback_to_snapshot("s1", &snapshot.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StateConflict(_)));
    }
}
