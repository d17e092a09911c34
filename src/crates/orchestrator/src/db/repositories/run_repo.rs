//! Run repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::{now_rfc3339, Run};

/// Run repository for managing run rows
pub struct RunRepository;

impl RunRepository {
    /// Insert a run row
    pub async fn create(pool: &DatabasePool, run: &Run) -> Result<Run, sqlx::Error> {
        sqlx::query_as::<_, Run>(
            "INSERT INTO runs (id, session_id, parent_run_id, trigger_source, status,
                               input_message, resume_payload, checkpoint_thread, checkpoint_ns,
                               latest_error, metrics, started_at, finished_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&run.id)
        .bind(&run.session_id)
        .bind(&run.parent_run_id)
        .bind(&run.trigger_source)
        .bind(&run.status)
        .bind(&run.input_message)
        .bind(&run.resume_payload)
        .bind(&run.checkpoint_thread)
        .bind(&run.checkpoint_ns)
        .bind(&run.latest_error)
        .bind(&run.metrics)
        .bind(&run.started_at)
        .bind(&run.finished_at)
        .bind(&run.created_at)
        .bind(&run.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a run by id
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Run>, sqlx::Error> {
        sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List runs for a session, newest first
    pub async fn list_by_session(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Vec<Run>, sqlx::Error> {
        sqlx::query_as::<_, Run>(
            "SELECT * FROM runs WHERE session_id = ? ORDER BY created_at DESC",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
    }

    /// The most recently updated `waiting_input` run for a session
    pub async fn latest_waiting(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Option<Run>, sqlx::Error> {
        sqlx::query_as::<_, Run>(
            "SELECT * FROM runs WHERE session_id = ? AND status = 'waiting_input'
             ORDER BY updated_at DESC, created_at DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(pool)
        .await
    }

    /// Runs still `running` whose last update is older than the cutoff
    pub async fn stale_running(
        pool: &DatabasePool,
        cutoff_rfc3339: &str,
    ) -> Result<Vec<Run>, sqlx::Error> {
        sqlx::query_as::<_, Run>(
            "SELECT * FROM runs WHERE status = 'running' AND updated_at < ?",
        )
        .bind(cutoff_rfc3339)
        .fetch_all(pool)
        .await
    }

    /// Persist every mutable column of a run row
    pub async fn update(pool: &DatabasePool, run: &Run) -> Result<Run, sqlx::Error> {
        sqlx::query_as::<_, Run>(
            "UPDATE runs SET status = ?, resume_payload = ?, latest_error = ?, metrics = ?,
                             started_at = ?, finished_at = ?, updated_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(&run.status)
        .bind(&run.resume_payload)
        .bind(&run.latest_error)
        .bind(&run.metrics)
        .bind(&run.started_at)
        .bind(&run.finished_at)
        .bind(now_rfc3339())
        .bind(&run.id)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::repositories::SessionRepository;
    use crate::db::schema::test_pool;

    fn run_for(session_id: &str, id: &str) -> Run {
        let now = now_rfc3339();
        Run {
            id: id.to_string(),
            session_id: session_id.to_string(),
            parent_run_id: None,
            trigger_source: "chat".to_string(),
            status: "queued".to_string(),
            input_message: "build a landing page".to_string(),
            resume_payload: None,
            checkpoint_thread: format!("{session_id}:{id}"),
            checkpoint_ns: None,
            latest_error: None,
            metrics: None,
            started_at: None,
            finished_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    async fn seeded_pool() -> DatabasePool {
        let pool = test_pool().await;
        let session = Session::new("s1".to_string(), "t".to_string());
        SessionRepository::create(&pool, &session).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let pool = seeded_pool().await;
        let created = RunRepository::create(&pool, &run_for("s1", "r1")).await.unwrap();
        assert_eq!(created.status, "queued");

        let fetched = RunRepository::get_by_id(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(fetched.checkpoint_thread, "s1:r1");
    }

    #[tokio::test]
    async fn test_latest_waiting_prefers_recent() {
        let pool = seeded_pool().await;
        let mut older = run_for("s1", "r1");
        older.status = "waiting_input".to_string();
        older.updated_at = "2020-01-01T00:00:00+00:00".to_string();
        RunRepository::create(&pool, &older).await.unwrap();

        let mut newer = run_for("s1", "r2");
        newer.status = "waiting_input".to_string();
        RunRepository::create(&pool, &newer).await.unwrap();

        let latest = RunRepository::latest_waiting(&pool, "s1").await.unwrap().unwrap();
        assert_eq!(latest.id, "r2");
    }

    #[tokio::test]
    async fn test_stale_running_filter() {
        let pool = seeded_pool().await;
        let mut stale = run_for("s1", "r1");
        stale.status = "running".to_string();
        RunRepository::create(&pool, &stale).await.unwrap();
        sqlx::query("UPDATE runs SET updated_at = '2020-01-01T00:00:00+00:00' WHERE id = 'r1'")
            .execute(&pool)
            .await
            .unwrap();

        let mut fresh = run_for("s1", "r2");
        fresh.status = "running".to_string();
        RunRepository::create(&pool, &fresh).await.unwrap();

        let stale_runs = RunRepository::stale_running(&pool, "2024-01-01T00:00:00+00:00")
            .await
            .unwrap();
        assert_eq!(stale_runs.len(), 1);
        assert_eq!(stale_runs[0].id, "r1");
    }
}
