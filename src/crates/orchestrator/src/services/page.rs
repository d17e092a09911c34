//! Page and page-version services
//!
//! Pages are unique per session by slug (`[a-z0-9-]+`, at most 40 chars).
//! Versions are append-only per page with the same pin/retention rules as
//! doc histories; the page's `current_version_id` is a weak reference
//! resolved at read time.

use crate::db::models::{
    now_rfc3339, EventSource, Page, PageVersion, VersionSource,
};
use crate::db::models::page::validate_slug;
use crate::db::repositories::{PageRepository, SessionRepository};
use crate::db::DatabasePool;
use crate::events::{EventEmitter, EventType};
use crate::services::product_doc::{MAX_AUTO, MAX_PINNED};
use crate::{OrchestratorError, Result};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// One page requested in a batch create
#[derive(Debug, Clone)]
pub struct NewPage {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub order_index: i64,
}

/// Service for page containers
#[derive(Clone)]
pub struct PageService {
    pool: DatabasePool,
    emitter: Option<Arc<EventEmitter>>,
}

impl PageService {
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

    /// Get a page or fail with `NotFound`
    pub async fn get_page(&self, page_id: &str) -> Result<Page> {
        PageRepository::get_by_id(&self.pool, page_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Page not found".to_string()))
    }

    /// Pages of a session in display order
    pub async fn list_pages(&self, session_id: &str) -> Result<Vec<Page>> {
        Ok(PageRepository::list_by_session(&self.pool, session_id).await?)
    }

    /// Create one page; slug must be valid and unused within the session
    pub async fn create_page(&self, session_id: &str, new_page: NewPage) -> Result<Page> {
        if SessionRepository::get_by_id(&self.pool, session_id).await?.is_none() {
            return Err(OrchestratorError::NotFound("Session not found".to_string()));
        }
        validate_slug(&new_page.slug)?;
        if PageRepository::get_by_slug(&self.pool, session_id, &new_page.slug)
            .await?
            .is_some()
        {
            return Err(OrchestratorError::Validation(format!(
                "slug '{}' already exists in session",
                new_page.slug
            )));
        }

        let now = now_rfc3339();
        let page = Page {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            title: new_page.title,
            slug: new_page.slug,
            description: new_page.description,
            order_index: new_page.order_index,
            current_version_id: None,
            created_at: now.clone(),
            updated_at: now,
        };
        let created = PageRepository::create(&self.pool, &page).await?;
        self.emit(
            EventType::PageCreated,
            json!({"page_id": created.id, "slug": created.slug}),
        )
        .await;
        Ok(created)
    }

    /// Create several pages; duplicate slugs within the batch are rejected
    /// before anything is written
    pub async fn create_pages(&self, session_id: &str, pages: Vec<NewPage>) -> Result<Vec<Page>> {
        let mut seen = HashSet::new();
        for page in &pages {
            validate_slug(&page.slug)?;
            if !seen.insert(page.slug.clone()) {
                return Err(OrchestratorError::Validation(format!(
                    "duplicate slug '{}' in batch",
                    page.slug
                )));
            }
        }
        let mut created = Vec::with_capacity(pages.len());
        for page in pages {
            created.push(self.create_page(session_id, page).await?);
        }
        Ok(created)
    }

    /// Update title/description/order of a page
    pub async fn update_page(
        &self,
        page_id: &str,
        title: Option<String>,
        description: Option<String>,
        order_index: Option<i64>,
    ) -> Result<Page> {
        let mut page = self.get_page(page_id).await?;
        if let Some(title) = title {
            page.title = title;
        }
        if let Some(description) = description {
            page.description = description;
        }
        if let Some(order_index) = order_index {
            page.order_index = order_index;
        }
        Ok(PageRepository::update(&self.pool, &page).await?)
    }

    /// Delete a page and its versions
    pub async fn delete_page(&self, page_id: &str) -> Result<()> {
        self.get_page(page_id).await?;
        Ok(PageRepository::delete(&self.pool, page_id).await?)
    }
}

/// Service for page versions
#[derive(Clone)]
pub struct PageVersionService {
    pool: DatabasePool,
    emitter: Option<Arc<EventEmitter>>,
}

impl PageVersionService {
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

    /// Append a version, point the page's current reference at it, and apply
    /// retention
    pub async fn create_version(
        &self,
        page_id: &str,
        html: &str,
        source: VersionSource,
        description: Option<&str>,
    ) -> Result<PageVersion> {
        let mut page = PageRepository::get_by_id(&self.pool, page_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Page not found".to_string()))?;

        let next_version = PageRepository::max_version(&self.pool, page_id)
            .await?
            .unwrap_or(0)
            + 1;
        let version = PageVersion {
            id: 0,
            page_id: page_id.to_string(),
            version: next_version,
            html: Some(html.to_string()),
            description: description.map(|s| s.to_string()),
            source: source.as_str().to_string(),
            is_pinned: false,
            is_released: false,
            released_at: None,
            payload_pruned_at: None,
            fallback_used: false,
            created_at: now_rfc3339(),
        };
        let created = PageRepository::create_version(&self.pool, &version).await?;

        page.current_version_id = Some(created.id);
        PageRepository::update(&self.pool, &page).await?;
        // Retention never fails the append that triggered it.
        if let Err(error) = self.apply_retention_policy(page_id).await {
            tracing::error!(page_id, %error, "page version retention failed");
        }

        self.emit(
            EventType::PageVersionCreated,
            json!({"page_id": page_id, "version_id": created.id, "version": created.version}),
        )
        .await;
        Ok(created)
    }

    /// The page's current version, falling back to the highest version
    pub async fn get_current(&self, page_id: &str) -> Result<Option<PageVersion>> {
        let page = PageRepository::get_by_id(&self.pool, page_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Page not found".to_string()))?;

        if let Some(current_id) = page.current_version_id {
            if let Some(version) = PageRepository::get_version(&self.pool, current_id).await? {
                return Ok(Some(version));
            }
        }
        let versions = PageRepository::list_versions(&self.pool, page_id, false).await?;
        Ok(versions.into_iter().next())
    }

    /// Versions of a page, highest first
    pub async fn list_versions(
        &self,
        page_id: &str,
        include_released: bool,
    ) -> Result<Vec<PageVersion>> {
        Ok(PageRepository::list_versions(&self.pool, page_id, include_released).await?)
    }

    /// A specific version for preview; released versions fail distinctly
    pub async fn preview_version(&self, page_id: &str, version_id: i64) -> Result<PageVersion> {
        let version = PageRepository::get_version(&self.pool, version_id)
            .await?
            .filter(|version| version.page_id == page_id)
            .ok_or_else(|| OrchestratorError::NotFound("Page version not found".to_string()))?;
        if version.is_released {
            return Err(OrchestratorError::StateConflict(
                "Page version content has been released".to_string(),
            ));
        }
        Ok(version)
    }

    /// Current version plus rendered HTML, with optional global CSS inlined
    /// before `</head>`
    pub async fn build_preview(
        &self,
        page_id: &str,
        global_style_css: Option<&str>,
    ) -> Result<(PageVersion, String)> {
        let version = self.get_current(page_id).await?.ok_or_else(|| {
            OrchestratorError::NotFound("Page has no versions".to_string())
        })?;
        if version.is_released {
            return Err(OrchestratorError::StateConflict(
                "Page version content has been released".to_string(),
            ));
        }
        let html = version.html.clone().unwrap_or_default();
        let rendered = match global_style_css {
            Some(css) if !css.trim().is_empty() => inline_global_style(&html, css),
            _ => html,
        };
        self.emit(
            EventType::PagePreviewReady,
            json!({"page_id": page_id, "version_id": version.id}),
        )
        .await;
        Ok((version, rendered))
    }

    /// Release everything beyond 2 pinned + 5 auto; returns released count
    pub async fn apply_retention_policy(&self, page_id: &str) -> Result<usize> {
        let versions = PageRepository::list_versions(&self.pool, page_id, true).await?;

        let pinned_keep: Vec<i64> = versions
            .iter()
            .filter(|version| version.is_pinned)
            .take(MAX_PINNED)
            .map(|version| version.id)
            .collect();
        let auto_keep: Vec<i64> = versions
            .iter()
            .filter(|version| {
                VersionSource::parse(&version.source) == Some(VersionSource::Auto)
            })
            .take(MAX_AUTO)
            .map(|version| version.id)
            .collect();
        let keep_ids: HashSet<i64> = pinned_keep.into_iter().chain(auto_keep).collect();

        let mut released = 0;
        for mut version in versions {
            if keep_ids.contains(&version.id) {
                if version.is_released {
                    version.is_released = false;
                    version.released_at = None;
                    PageRepository::update_version_flags(&self.pool, &version).await?;
                }
                continue;
            }
            if version.is_released {
                continue;
            }
            let now = now_rfc3339();
            version.is_released = true;
            version.released_at = Some(now.clone());
            version.payload_pruned_at = Some(now);
            version.html = None;
            PageRepository::update_version_flags(&self.pool, &version).await?;
            released += 1;
        }
        Ok(released)
    }

    /// Pin a version; at most 2 pinned per page
    pub async fn pin_version(&self, page_id: &str, version_id: i64) -> Result<PageVersion> {
        let mut version = PageRepository::get_version(&self.pool, version_id)
            .await?
            .filter(|version| version.page_id == page_id)
            .ok_or_else(|| OrchestratorError::NotFound("Page version not found".to_string()))?;
        if version.is_pinned {
            return Ok(version);
        }

        let pinned: Vec<String> = PageRepository::list_versions(&self.pool, page_id, true)
            .await?
            .into_iter()
            .filter(|item| item.is_pinned)
            .map(|item| item.id.to_string())
            .collect();
        if pinned.len() >= MAX_PINNED {
            return Err(OrchestratorError::PinnedLimitExceeded {
                current_pinned: pinned,
            });
        }

        version.is_pinned = true;
        if version.is_released {
            version.is_released = false;
            version.released_at = None;
        }
        PageRepository::update_version_flags(&self.pool, &version).await?;
        self.apply_retention_policy(page_id).await?;
        Ok(PageRepository::get_version(&self.pool, version_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Page version not found".to_string()))?)
    }

    /// Unpin a version and re-run retention
    pub async fn unpin_version(&self, page_id: &str, version_id: i64) -> Result<PageVersion> {
        let mut version = PageRepository::get_version(&self.pool, version_id)
            .await?
            .filter(|version| version.page_id == page_id)
            .ok_or_else(|| OrchestratorError::NotFound("Page version not found".to_string()))?;
        if version.is_pinned {
            version.is_pinned = false;
            PageRepository::update_version_flags(&self.pool, &version).await?;
            self.apply_retention_policy(page_id).await?;
        }
        Ok(PageRepository::get_version(&self.pool, version_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Page version not found".to_string()))?)
    }
}

/// Insert a `<style>` block right before `</head>`; appended when no head
/// closing tag exists
fn inline_global_style(html: &str, css: &str) -> String {
    let style_block = format!("<style>\n{css}\n</style>");
    match html.find("</head>") {
        Some(index) => {
            let mut rendered = String::with_capacity(html.len() + style_block.len());
            rendered.push_str(&html[..index]);
            rendered.push_str(&style_block);
            rendered.push_str(&html[index..]);
            rendered
        }
        None => format!("{html}\n{style_block}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::schema::test_pool;

    async fn services() -> (PageService, PageVersionService, String) {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
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
        (pages, PageVersionService::new(pool), page.id)
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let (pages, _, _) = services().await;
        let err = pages
            .create_page(
                "s1",
                NewPage {
                    title: "Other".to_string(),
                    slug: "home".to_string(),
                    description: String::new(),
                    order_index: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_batch_duplicate_slug_rejected_before_write() {
        let (pages, _, _) = services().await;
        let err = pages
            .create_pages(
                "s1",
                vec![
                    NewPage {
                        title: "A".to_string(),
                        slug: "about".to_string(),
                        description: String::new(),
                        order_index: 1,
                    },
                    NewPage {
                        title: "B".to_string(),
                        slug: "about".to_string(),
                        description: String::new(),
                        order_index: 2,
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
        assert_eq!(pages.list_pages("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_version_numbering_and_current_reference() {
        let (_, versions, page_id) = services().await;
        let v1 = versions
            .create_version(&page_id, "<html>1</html>", VersionSource::Auto, None)
            .await
            .unwrap();
        let v2 = versions
            .create_version(&page_id, "<html>2</html>", VersionSource::Auto, None)
            .await
            .unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        let current = versions.get_current(&page_id).await.unwrap().unwrap();
        assert_eq!(current.id, v2.id);
        assert_eq!(current.html.as_deref(), Some("<html>2</html>"));
    }

    #[tokio::test]
    async fn test_preview_released_version_fails() {
        let (_, versions, page_id) = services().await;
        for index in 0..7 {
            versions
                .create_version(&page_id, &format!("<html>{index}</html>"), VersionSource::Auto, None)
                .await
                .unwrap();
        }
        let all = versions.list_versions(&page_id, true).await.unwrap();
        let released = all.iter().find(|version| version.is_released).unwrap();

        let err = versions
            .preview_version(&page_id, released.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StateConflict(_)));
        assert!(released.payload_pruned_at.is_some());
    }

    #[tokio::test]
    async fn test_build_preview_inlines_css() {
        let (_, versions, page_id) = services().await;
        versions
            .create_version(
                &page_id,
                "<html><head><title>x</title></head><body></body></html>",
                VersionSource::Auto,
                None,
            )
            .await
            .unwrap();

        let (_, rendered) = versions
            .build_preview(&page_id, Some("body { margin: 0; }"))
            .await
            .unwrap();
        let style_at = rendered.find("<style>").unwrap();
        let head_close_at = rendered.find("</head>").unwrap();
        assert!(style_at < head_close_at);
        assert!(rendered.contains("margin: 0"));
    }

    #[tokio::test]
    async fn test_pin_cap_on_versions() {
        let (_, versions, page_id) = services().await;
        let mut ids = Vec::new();
        for index in 0..3 {
            ids.push(
                versions
                    .create_version(&page_id, &format!("<html>{index}</html>"), VersionSource::Auto, None)
                    .await
                    .unwrap()
                    .id,
            );
        }
        versions.pin_version(&page_id, ids[0]).await.unwrap();
        versions.pin_version(&page_id, ids[1]).await.unwrap();
        let err = versions.pin_version(&page_id, ids[2]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PinnedLimitExceeded { .. }));
    }
}
