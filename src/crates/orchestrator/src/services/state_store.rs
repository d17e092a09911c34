//! Graph-state and build metadata persistence on sessions

use crate::db::models::{BuildStatus, Session};
use crate::db::repositories::SessionRepository;
use crate::db::DatabasePool;
use crate::{OrchestratorError, Result};

/// Runtime-only state keys never persisted (tool handles, live connections)
const EPHEMERAL_KEYS: &[&str] = &["mcp_tools", "mcp_tool_handlers", "__resume__"];

/// Partial update of the session metadata columns
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub graph_state: Option<serde_json::Value>,
    pub build_status: Option<BuildStatus>,
    pub build_artifacts: Option<serde_json::Value>,
    pub aesthetic_scores: Option<serde_json::Value>,
}

/// Persist and retrieve per-session graph state + build metadata
#[derive(Clone)]
pub struct StateStoreService {
    pool: DatabasePool,
}

impl StateStoreService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Save the full graph state, stripping ephemeral runtime keys first
    pub async fn save_state(&self, session_id: &str, state: &serde_json::Value) -> Result<bool> {
        if !state.is_object() {
            return Err(OrchestratorError::Validation(
                "Graph state must be an object".to_string(),
            ));
        }
        self.update_metadata(
            session_id,
            MetadataUpdate {
                graph_state: Some(state.clone()),
                ..Default::default()
            },
        )
        .await
        .map(|session| session.is_some())
    }

    /// Load the stored graph state of a session
    pub async fn load_state(&self, session_id: &str) -> Result<Option<serde_json::Value>> {
        let Some(session) = SessionRepository::get_by_id(&self.pool, session_id).await? else {
            return Ok(None);
        };
        Ok(session
            .graph_state
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .filter(serde_json::Value::is_object))
    }

    /// Drop the stored graph state
    pub async fn clear_state(&self, session_id: &str) -> Result<bool> {
        let Some(mut session) = SessionRepository::get_by_id(&self.pool, session_id).await? else {
            return Ok(false);
        };
        session.graph_state = None;
        SessionRepository::update(&self.pool, &session).await?;
        Ok(true)
    }

    /// Merge the supplied keys into the session metadata
    ///
    /// Only the fields present in the update are written; `updated_at` is
    /// refreshed on every call.
    pub async fn update_metadata(
        &self,
        session_id: &str,
        update: MetadataUpdate,
    ) -> Result<Option<Session>> {
        let Some(mut session) = SessionRepository::get_by_id(&self.pool, session_id).await? else {
            return Ok(None);
        };

        if let Some(state) = update.graph_state {
            if !state.is_object() {
                return Err(OrchestratorError::Validation(
                    "Graph state must be an object".to_string(),
                ));
            }
            session.graph_state = Some(strip_ephemeral_keys(state).to_string());
        }
        if let Some(status) = update.build_status {
            session.build_status = status.as_str().to_string();
        }
        if let Some(artifacts) = update.build_artifacts {
            session.build_artifacts = Some(artifacts.to_string());
        }
        if let Some(scores) = update.aesthetic_scores {
            session.aesthetic_scores = Some(scores.to_string());
        }

        SessionRepository::update(&self.pool, &session).await?;
        Ok(SessionRepository::get_by_id(&self.pool, session_id).await?)
    }
}

/// Remove runtime-only keys before a state lands in the database
pub fn strip_ephemeral_keys(mut state: serde_json::Value) -> serde_json::Value {
    if let Some(map) = state.as_object_mut() {
        for key in EPHEMERAL_KEYS {
            map.remove(*key);
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SessionRepository;
    use crate::db::schema::test_pool;
    use serde_json::json;

    async fn service() -> StateStoreService {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();
        StateStoreService::new(pool)
    }

    #[tokio::test]
    async fn test_save_and_load_state() {
        let service = service().await;
        let saved = service
            .save_state("s1", &json!({"pages": ["home"], "mcp_tools": [1]}))
            .await
            .unwrap();
        assert!(saved);

        let state = service.load_state("s1").await.unwrap().unwrap();
        assert_eq!(state["pages"][0], "home");
        assert!(state.get("mcp_tools").is_none(), "ephemeral keys must be stripped");
    }

    #[tokio::test]
    async fn test_update_metadata_is_partial() {
        let service = service().await;
        service
            .update_metadata(
                "s1",
                MetadataUpdate {
                    build_status: Some(BuildStatus::Success),
                    build_artifacts: Some(json!({"pages": 3})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let session = service
            .update_metadata(
                "s1",
                MetadataUpdate {
                    aesthetic_scores: Some(json!({"overall": 8.5})),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.build_status, "success");
        assert!(session.build_artifacts.unwrap().contains("pages"));
        assert!(session.aesthetic_scores.unwrap().contains("8.5"));
    }

    #[tokio::test]
    async fn test_unknown_session_returns_none() {
        let service = service().await;
        let updated = service
            .update_metadata("ghost", MetadataUpdate::default())
            .await
            .unwrap();
        assert!(updated.is_none());
        assert!(!service.save_state("ghost", &json!({})).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_state() {
        let service = service().await;
        service.save_state("s1", &json!({"a": 1})).await.unwrap();
        assert!(service.clear_state("s1").await.unwrap());
        assert!(service.load_state("s1").await.unwrap().is_none());
    }
}
