//! Session CRUD service

use crate::db::models::Session;
use crate::db::repositories::SessionRepository;
use crate::db::DatabasePool;
use crate::{OrchestratorError, Result};
use uuid::Uuid;

/// Service for session containers
#[derive(Clone)]
pub struct SessionService {
    pool: DatabasePool,
}

impl SessionService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a session with a generated id
    pub async fn create_session(&self, title: &str) -> Result<Session> {
        let title = title.trim();
        if title.is_empty() {
            return Err(OrchestratorError::Validation("title is required".to_string()));
        }
        let session = Session::new(Uuid::new_v4().to_string(), title.to_string());
        Ok(SessionRepository::create(&self.pool, &session).await?)
    }

    /// Get a session or fail with `NotFound`
    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        SessionRepository::get_by_id(&self.pool, session_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Session not found".to_string()))
    }

    /// List all sessions, newest first
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        Ok(SessionRepository::list(&self.pool).await?)
    }

    /// Update the display title
    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<Session> {
        let mut session = self.get_session(session_id).await?;
        let title = title.trim();
        if title.is_empty() {
            return Err(OrchestratorError::Validation("title is required".to_string()));
        }
        session.title = title.to_string();
        SessionRepository::update(&self.pool, &session).await?;
        self.get_session(session_id).await
    }

    /// Update routing metadata produced by classification
    pub async fn set_routing(
        &self,
        session_id: &str,
        product_type: Option<String>,
        complexity: Option<String>,
        skill_id: Option<String>,
        doc_tier: Option<String>,
    ) -> Result<Session> {
        let mut session = self.get_session(session_id).await?;
        if product_type.is_some() {
            session.product_type = product_type;
        }
        if complexity.is_some() {
            session.complexity = complexity;
        }
        if skill_id.is_some() {
            session.skill_id = skill_id;
        }
        if doc_tier.is_some() {
            session.doc_tier = doc_tier;
        }
        SessionRepository::update(&self.pool, &session).await?;
        self.get_session(session_id).await
    }

    /// Delete a session; owned rows (runs, doc, pages, snapshots, events) cascade
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.get_session(session_id).await?;
        Ok(SessionRepository::delete(&self.pool, session_id).await?)
    }
}
