//! Session event repository
//!
//! `append` assigns the next per-session `seq` inside the same transaction as
//! the insert, so sequences are strictly increasing and gap-free even with
//! concurrent emitters; the `(session_id, seq)` unique index is the backstop.

use crate::db::connection::DatabasePool;
use crate::db::models::{now_rfc3339, SessionEvent};
use uuid::Uuid;

/// Repository for the append-only per-session event log
pub struct EventRepository;

impl EventRepository {
    /// Append one event, assigning the next sequence number
    ///
    /// # Arguments
    /// * `run_id` - run correlation, when the event belongs to a run
    /// * `event_type` - event type string
    /// * `payload` - JSON payload
    /// * `source` - "session", "plan", or "task"
    pub async fn append(
        pool: &DatabasePool,
        session_id: &str,
        run_id: Option<&str>,
        event_type: &str,
        payload: &serde_json::Value,
        source: &str,
    ) -> Result<SessionEvent, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM session_events WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        let event = sqlx::query_as::<_, SessionEvent>(
            "INSERT INTO session_events (session_id, run_id, event_id, seq, type, payload,
                                         source, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(session_id)
        .bind(run_id)
        .bind(Uuid::new_v4().to_string())
        .bind(next_seq)
        .bind(event_type)
        .bind(payload.to_string())
        .bind(source)
        .bind(now_rfc3339())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(event)
    }

    /// Events of a session with `seq > since_seq`, ascending
    pub async fn get_events(
        pool: &DatabasePool,
        session_id: &str,
        since_seq: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SessionEvent>, sqlx::Error> {
        sqlx::query_as::<_, SessionEvent>(
            "SELECT * FROM session_events WHERE session_id = ? AND seq > ?
             ORDER BY seq ASC LIMIT ?",
        )
        .bind(session_id)
        .bind(since_seq.unwrap_or(0))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Run-scoped events of a session with `seq > since_seq`, ascending
    pub async fn get_events_by_run(
        pool: &DatabasePool,
        session_id: &str,
        run_id: &str,
        since_seq: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SessionEvent>, sqlx::Error> {
        sqlx::query_as::<_, SessionEvent>(
            "SELECT * FROM session_events WHERE session_id = ? AND run_id = ? AND seq > ?
             ORDER BY seq ASC LIMIT ?",
        )
        .bind(session_id)
        .bind(run_id)
        .bind(since_seq.unwrap_or(0))
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::repositories::SessionRepository;
    use crate::db::schema::test_pool;
    use serde_json::json;

    async fn seeded_pool() -> DatabasePool {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_seq_is_gap_free_and_monotonic() {
        let pool = seeded_pool().await;
        for index in 0..5 {
            let event = EventRepository::append(
                &pool,
                "s1",
                None,
                "task_progress",
                &json!({"index": index}),
                "session",
            )
            .await
            .unwrap();
            assert_eq!(event.seq, index + 1);
        }
    }

    #[tokio::test]
    async fn test_get_events_since_seq() {
        let pool = seeded_pool().await;
        for _ in 0..3 {
            EventRepository::append(&pool, "s1", None, "task_progress", &json!({}), "session")
                .await
                .unwrap();
        }

        let events = EventRepository::get_events(&pool, "s1", Some(1), 100)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 2);
        assert_eq!(events[1].seq, 3);
    }

    #[tokio::test]
    async fn test_run_scoped_query_filters() {
        let pool = seeded_pool().await;
        EventRepository::append(&pool, "s1", Some("r1"), "run_started", &json!({}), "session")
            .await
            .unwrap();
        EventRepository::append(&pool, "s1", Some("r2"), "run_started", &json!({}), "session")
            .await
            .unwrap();
        EventRepository::append(&pool, "s1", Some("r1"), "run_completed", &json!({}), "session")
            .await
            .unwrap();

        let events = EventRepository::get_events_by_run(&pool, "s1", "r1", None, 100)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[1].seq, 3);
    }

    #[tokio::test]
    async fn test_event_ids_unique() {
        let pool = seeded_pool().await;
        let first = EventRepository::append(&pool, "s1", None, "done", &json!({}), "session")
            .await
            .unwrap();
        let second = EventRepository::append(&pool, "s1", None, "done", &json!({}), "session")
            .await
            .unwrap();
        assert_ne!(first.event_id, second.event_id);
    }
}
