//! Session repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::{now_rfc3339, Session};

/// Session repository for managing session rows
pub struct SessionRepository;

impl SessionRepository {
    /// Insert a session row
    pub async fn create(pool: &DatabasePool, session: &Session) -> Result<Session, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, title, product_type, complexity, skill_id, doc_tier,
                                   graph_state, build_status, build_artifacts, aesthetic_scores,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&session.id)
        .bind(&session.title)
        .bind(&session.product_type)
        .bind(&session.complexity)
        .bind(&session.skill_id)
        .bind(&session.doc_tier)
        .bind(&session.graph_state)
        .bind(&session.build_status)
        .bind(&session.build_artifacts)
        .bind(&session.aesthetic_scores)
        .bind(&session.created_at)
        .bind(&session.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a session by id
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all sessions, newest first
    pub async fn list(pool: &DatabasePool) -> Result<Vec<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
    }

    /// Persist every mutable column of a session row
    pub async fn update(pool: &DatabasePool, session: &Session) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sessions SET title = ?, product_type = ?, complexity = ?, skill_id = ?,
                                 doc_tier = ?, graph_state = ?, build_status = ?,
                                 build_artifacts = ?, aesthetic_scores = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&session.title)
        .bind(&session.product_type)
        .bind(&session.complexity)
        .bind(&session.skill_id)
        .bind(&session.doc_tier)
        .bind(&session.graph_state)
        .bind(&session.build_status)
        .bind(&session.build_artifacts)
        .bind(&session.aesthetic_scores)
        .bind(now_rfc3339())
        .bind(&session.id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Refresh `updated_at`
    pub async fn touch(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(now_rfc3339())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a session; owned rows cascade
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_pool;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let pool = test_pool().await;
        let session = Session::new("s1".to_string(), "My store".to_string());

        let created = SessionRepository::create(&pool, &session).await.unwrap();
        assert_eq!(created.build_status, "pending");

        let fetched = SessionRepository::get_by_id(&pool, "s1").await.unwrap();
        assert_eq!(fetched.map(|s| s.title), Some("My store".to_string()));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_runs() {
        let pool = test_pool().await;
        let session = Session::new("s1".to_string(), "t".to_string());
        SessionRepository::create(&pool, &session).await.unwrap();

        let now = now_rfc3339();
        sqlx::query(
            "INSERT INTO runs (id, session_id, checkpoint_thread, created_at, updated_at)
             VALUES ('r1', 's1', 's1:r1', ?, ?)",
        )
        .bind(&now)
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

        SessionRepository::delete(&pool, "s1").await.unwrap();
        let runs: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM runs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(runs.0, 0);
    }
}
