//! Product doc service: the source-of-truth spec and its version history
//!
//! Updates merge the structured payload deeply (nested maps recurse, scalars
//! overwrite), append a history row with the monotonically next version
//! number, and run retention. Retention keeps up to 2 pinned plus up to 5
//! auto-source histories; everything else is released with payloads nulled.

use crate::db::models::{
    now_rfc3339, EventSource, ProductDoc, ProductDocHistory, ProductDocStatus, VersionSource,
};
use crate::db::repositories::{ProductDocRepository, SessionRepository};
use crate::db::DatabasePool;
use crate::events::{EventEmitter, EventType};
use crate::{OrchestratorError, Result};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Retention caps shared by every versioned parent
pub const MAX_PINNED: usize = 2;
pub const MAX_AUTO: usize = 5;

/// Service for product docs and their histories
#[derive(Clone)]
pub struct ProductDocService {
    pool: DatabasePool,
    emitter: Option<Arc<EventEmitter>>,
}

impl ProductDocService {
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

    /// The (single) doc of a session
    pub async fn get_by_session(&self, session_id: &str) -> Result<Option<ProductDoc>> {
        Ok(ProductDocRepository::get_by_session(&self.pool, session_id).await?)
    }

    /// Get a doc or fail with `NotFound`
    pub async fn get_doc(&self, doc_id: &str) -> Result<ProductDoc> {
        ProductDocRepository::get_by_id(&self.pool, doc_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("ProductDoc not found".to_string()))
    }

    /// Create the doc for a session; refuses when one already exists
    pub async fn create(
        &self,
        session_id: &str,
        content: &str,
        structured: Option<serde_json::Value>,
        status: ProductDocStatus,
    ) -> Result<ProductDoc> {
        if SessionRepository::get_by_id(&self.pool, session_id).await?.is_none() {
            return Err(OrchestratorError::NotFound("Session not found".to_string()));
        }
        if self.get_by_session(session_id).await?.is_some() {
            return Err(OrchestratorError::StateConflict(
                "ProductDoc already exists for session".to_string(),
            ));
        }

        let now = now_rfc3339();
        let doc = ProductDoc {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            structured: structured.unwrap_or_else(|| json!({})).to_string(),
            version: 1,
            status: status.as_str().to_string(),
            pending_regeneration_pages: "[]".to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        let created = ProductDocRepository::create(&self.pool, &doc).await?;
        self.emit(
            EventType::ProductDocGenerated,
            json!({"doc_id": created.id, "status": created.status}),
        )
        .await;
        Ok(created)
    }

    /// Update content and/or structured payload
    ///
    /// Any content change appends a history row and bumps the doc version.
    pub async fn update(
        &self,
        doc_id: &str,
        content: Option<&str>,
        structured: Option<serde_json::Value>,
        change_summary: Option<&str>,
        affected_pages: Option<Vec<String>>,
    ) -> Result<ProductDoc> {
        let mut doc = self.get_doc(doc_id).await?;
        let bump_version = content.is_some() || structured.is_some();

        if let Some(content) = content {
            doc.content = content.to_string();
        }
        if let Some(patch) = structured {
            let merged = deep_merge(doc.structured_value(), patch);
            doc.structured = merged.to_string();
        }
        if let Some(pages) = affected_pages {
            doc.pending_regeneration_pages = serde_json::to_string(&normalize_slugs(pages))?;
        }
        let doc = ProductDocRepository::update(&self.pool, &doc).await?;

        if bump_version {
            self.create_history(
                doc_id,
                &doc.content,
                doc.structured_value(),
                VersionSource::Auto,
                change_summary,
            )
            .await?;
        }

        let updated = self.get_doc(doc_id).await?;
        self.emit(
            EventType::ProductDocUpdated,
            json!({"doc_id": doc_id, "change_summary": change_summary}),
        )
        .await;
        Ok(updated)
    }

    /// Append a history row with the next version number and apply retention
    pub async fn create_history(
        &self,
        doc_id: &str,
        content: &str,
        structured: serde_json::Value,
        source: VersionSource,
        change_summary: Option<&str>,
    ) -> Result<ProductDocHistory> {
        let mut doc = self.get_doc(doc_id).await?;
        let max_history = ProductDocRepository::max_history_version(&self.pool, doc_id)
            .await?
            .unwrap_or(0);
        let next_version = doc.version.max(max_history) + 1;

        doc.version = next_version;
        ProductDocRepository::update(&self.pool, &doc).await?;

        let history = ProductDocHistory {
            id: 0,
            product_doc_id: doc_id.to_string(),
            version: next_version,
            content: Some(content.to_string()),
            structured: Some(structured.to_string()),
            change_summary: change_summary.map(|s| s.to_string()),
            source: source.as_str().to_string(),
            is_pinned: false,
            is_released: false,
            released_at: None,
            created_at: now_rfc3339(),
        };
        let created = ProductDocRepository::create_history(&self.pool, &history).await?;
        // Retention never fails the append that triggered it.
        if let Err(error) = self.apply_retention_policy(doc_id).await {
            tracing::error!(doc_id, %error, "history retention failed");
        }

        self.emit(
            EventType::HistoryCreated,
            json!({
                "history_id": created.id,
                "version": created.version,
                "source": created.source,
                "change_summary": created.change_summary,
            }),
        )
        .await;
        Ok(created)
    }

    /// Histories of a doc, highest version first
    pub async fn get_history(
        &self,
        doc_id: &str,
        include_released: bool,
    ) -> Result<Vec<ProductDocHistory>> {
        Ok(ProductDocRepository::list_histories(&self.pool, doc_id, include_released).await?)
    }

    /// Get one history row or fail with `NotFound`
    pub async fn get_history_version(&self, history_id: i64) -> Result<ProductDocHistory> {
        ProductDocRepository::get_history(&self.pool, history_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("ProductDocHistory not found".to_string()))
    }

    /// Pin a history row; at most 2 pinned per doc
    pub async fn pin_history(&self, history_id: i64) -> Result<ProductDocHistory> {
        let mut history = self.get_history_version(history_id).await?;
        if history.is_pinned {
            return Ok(history);
        }

        let pinned: Vec<String> = self
            .get_history(&history.product_doc_id, true)
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

        history.is_pinned = true;
        if history.is_released {
            // Bookkeeping only: a pruned payload is not recoverable.
            history.is_released = false;
            history.released_at = None;
        }
        ProductDocRepository::update_history_flags(&self.pool, &history).await?;
        self.apply_retention_policy(&history.product_doc_id).await?;
        self.get_history_version(history_id).await
    }

    /// Unpin a history row and re-run retention
    pub async fn unpin_history(&self, history_id: i64) -> Result<ProductDocHistory> {
        let mut history = self.get_history_version(history_id).await?;
        if !history.is_pinned {
            return Ok(history);
        }
        history.is_pinned = false;
        ProductDocRepository::update_history_flags(&self.pool, &history).await?;
        self.apply_retention_policy(&history.product_doc_id).await?;
        self.get_history_version(history_id).await
    }

    /// draft -> confirmed / outdated -> confirmed
    pub async fn confirm(&self, doc_id: &str) -> Result<ProductDoc> {
        let doc = self
            .transition_status(doc_id, ProductDocStatus::Confirmed)
            .await?;
        self.emit(EventType::ProductDocConfirmed, json!({"doc_id": doc_id})).await;
        Ok(doc)
    }

    /// confirmed -> outdated
    pub async fn mark_outdated(&self, doc_id: &str) -> Result<ProductDoc> {
        let doc = self
            .transition_status(doc_id, ProductDocStatus::Outdated)
            .await?;
        self.emit(EventType::ProductDocOutdated, json!({"doc_id": doc_id})).await;
        Ok(doc)
    }

    async fn transition_status(
        &self,
        doc_id: &str,
        next: ProductDocStatus,
    ) -> Result<ProductDoc> {
        let mut doc = self.get_doc(doc_id).await?;
        let current = doc.doc_status();
        if current == next {
            return Ok(doc);
        }
        if !current.can_transition_to(next) {
            return Err(OrchestratorError::StateConflict(format!(
                "Invalid product doc transition {} -> {}",
                current.as_str(),
                next.as_str()
            )));
        }
        doc.status = next.as_str().to_string();
        Ok(ProductDocRepository::update(&self.pool, &doc).await?)
    }

    /// Store normalized page slugs awaiting regeneration
    pub async fn set_pending_regeneration(
        &self,
        doc_id: &str,
        pages: Vec<String>,
    ) -> Result<ProductDoc> {
        let mut doc = self.get_doc(doc_id).await?;
        doc.pending_regeneration_pages = serde_json::to_string(&normalize_slugs(pages))?;
        Ok(ProductDocRepository::update(&self.pool, &doc).await?)
    }

    /// Release everything beyond 2 pinned + 5 auto; returns released count
    pub async fn apply_retention_policy(&self, doc_id: &str) -> Result<usize> {
        let histories =
            ProductDocRepository::list_histories(&self.pool, doc_id, true).await?;

        let pinned_keep: Vec<i64> = histories
            .iter()
            .filter(|item| item.is_pinned)
            .take(MAX_PINNED)
            .map(|item| item.id)
            .collect();
        let auto_keep: Vec<i64> = histories
            .iter()
            .filter(|item| item.version_source() == VersionSource::Auto)
            .take(MAX_AUTO)
            .map(|item| item.id)
            .collect();
        let keep_ids: std::collections::HashSet<i64> =
            pinned_keep.into_iter().chain(auto_keep).collect();

        let mut released = 0;
        for mut history in histories {
            if keep_ids.contains(&history.id) {
                if history.is_released {
                    // Racing pins can leave a kept row released; restore the
                    // bookkeeping (payloads stay gone).
                    history.is_released = false;
                    history.released_at = None;
                    ProductDocRepository::update_history_flags(&self.pool, &history).await?;
                }
                continue;
            }
            if history.is_released {
                continue;
            }
            history.is_released = true;
            history.released_at = Some(now_rfc3339());
            history.content = None;
            history.structured = None;
            ProductDocRepository::update_history_flags(&self.pool, &history).await?;
            released += 1;
        }
        Ok(released)
    }
}

/// Deep-merge `patch` into `base`: nested objects recurse, scalars overwrite,
/// and explicit nulls in the patch leave the base value untouched
pub fn deep_merge(base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    continue;
                }
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => patch_value,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}

fn normalize_slugs(pages: Vec<String>) -> Vec<String> {
    pages
        .into_iter()
        .map(|slug| slug.trim().to_lowercase())
        .filter(|slug| !slug.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::schema::test_pool;

    async fn service() -> ProductDocService {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();
        ProductDocService::new(pool)
    }

    #[test]
    fn test_deep_merge_recurses_and_overwrites() {
        let base = json!({"a": {"x": 1, "y": 2}, "b": "old", "c": [1, 2]});
        let patch = json!({"a": {"y": 3, "z": 4}, "b": "new", "c": [9]});
        let merged = deep_merge(base, patch);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": "new", "c": [9]}));
    }

    #[test]
    fn test_deep_merge_null_preserves_base() {
        let base = json!({"a": {"x": 1, "y": 2}, "b": "kept"});
        let patch = json!({"a": {"x": null, "y": 5}, "b": null, "d": null});
        let merged = deep_merge(base, patch);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 5}, "b": "kept"}));
    }

    #[tokio::test]
    async fn test_create_refuses_duplicate() {
        let service = service().await;
        service
            .create("s1", "# Doc", None, ProductDocStatus::Draft)
            .await
            .unwrap();
        let err = service
            .create("s1", "# Again", None, ProductDocStatus::Draft)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StateConflict(_)));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_appends_history() {
        let service = service().await;
        let doc = service
            .create("s1", "# v1", Some(json!({"pages": {"home": {}}})), ProductDocStatus::Draft)
            .await
            .unwrap();
        assert_eq!(doc.version, 1);

        let updated = service
            .update(&doc.id, Some("# v2"), Some(json!({"pages": {"about": {}}})), Some("add about"), None)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        let structured = updated.structured_value();
        assert!(structured["pages"]["home"].is_object());
        assert!(structured["pages"]["about"].is_object());

        let history = service.get_history(&doc.id, true).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 2);
        assert_eq!(history[0].change_summary.as_deref(), Some("add about"));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let service = service().await;
        let doc = service
            .create("s1", "# doc", None, ProductDocStatus::Draft)
            .await
            .unwrap();

        let confirmed = service.confirm(&doc.id).await.unwrap();
        assert_eq!(confirmed.status, "confirmed");
        let outdated = service.mark_outdated(&doc.id).await.unwrap();
        assert_eq!(outdated.status, "outdated");
        let reconfirmed = service.confirm(&doc.id).await.unwrap();
        assert_eq!(reconfirmed.status, "confirmed");
    }

    #[tokio::test]
    async fn test_outdated_requires_confirmed() {
        let service = service().await;
        let doc = service
            .create("s1", "# doc", None, ProductDocStatus::Draft)
            .await
            .unwrap();
        let err = service.mark_outdated(&doc.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::StateConflict(_)));
    }

    #[tokio::test]
    async fn test_pin_limit_carries_current_ids() {
        let service = service().await;
        let doc = service
            .create("s1", "# doc", None, ProductDocStatus::Draft)
            .await
            .unwrap();
        for index in 0..3 {
            service
                .update(&doc.id, Some(&format!("# v{index}")), None, None, None)
                .await
                .unwrap();
        }
        let history = service.get_history(&doc.id, true).await.unwrap();
        service.pin_history(history[0].id).await.unwrap();
        service.pin_history(history[1].id).await.unwrap();

        let err = service.pin_history(history[2].id).await.unwrap_err();
        match err {
            OrchestratorError::PinnedLimitExceeded { current_pinned } => {
                assert_eq!(current_pinned.len(), 2);
                assert!(current_pinned.contains(&history[0].id.to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let third = service.get_history_version(history[2].id).await.unwrap();
        assert!(!third.is_pinned);
    }

    #[tokio::test]
    async fn test_retention_releases_beyond_caps() {
        let service = service().await;
        let doc = service
            .create("s1", "# doc", None, ProductDocStatus::Draft)
            .await
            .unwrap();
        for index in 0..8 {
            service
                .update(&doc.id, Some(&format!("# v{index}")), None, None, None)
                .await
                .unwrap();
        }

        let all = service.get_history(&doc.id, true).await.unwrap();
        assert_eq!(all.len(), 8);
        let live: Vec<_> = all.iter().filter(|item| !item.is_released).collect();
        assert_eq!(live.len(), MAX_AUTO);

        for released in all.iter().filter(|item| item.is_released) {
            assert!(released.content.is_none());
            assert!(released.structured.is_none());
            assert!(released.released_at.is_some());
        }

        // Released rows stay listed but are excluded from the live listing.
        let visible = service.get_history(&doc.id, false).await.unwrap();
        assert_eq!(visible.len(), MAX_AUTO);
    }
}
