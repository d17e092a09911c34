//! Durable event store over the session event log

use crate::db::models::{EventSource, SessionEvent};
use crate::db::repositories::EventRepository;
use crate::db::DatabasePool;
use crate::events::types::EventType;
use crate::Result;

/// Append and query the per-session event log
#[derive(Clone)]
pub struct EventStore {
    pool: DatabasePool,
}

impl EventStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Append one event; the next `seq` is assigned atomically
    pub async fn append(
        &self,
        session_id: &str,
        run_id: Option<&str>,
        event_type: EventType,
        payload: &serde_json::Value,
        source: EventSource,
    ) -> Result<SessionEvent> {
        Ok(EventRepository::append(
            &self.pool,
            session_id,
            run_id,
            event_type.as_str(),
            payload,
            source.as_str(),
        )
        .await?)
    }

    /// Events with `seq > since_seq`, plus whether more remain beyond `limit`
    pub async fn get_events(
        &self,
        session_id: &str,
        since_seq: Option<i64>,
        limit: i64,
    ) -> Result<(Vec<SessionEvent>, bool)> {
        let mut events =
            EventRepository::get_events(&self.pool, session_id, since_seq, limit + 1).await?;
        let has_more = events.len() as i64 > limit;
        if has_more {
            events.truncate(limit as usize);
        }
        Ok((events, has_more))
    }

    /// Run-scoped variant of [`get_events`](Self::get_events)
    pub async fn get_events_by_run(
        &self,
        session_id: &str,
        run_id: &str,
        since_seq: Option<i64>,
        limit: i64,
    ) -> Result<(Vec<SessionEvent>, bool)> {
        let mut events =
            EventRepository::get_events_by_run(&self.pool, session_id, run_id, since_seq, limit + 1)
                .await?;
        let has_more = events.len() as i64 > limit;
        if has_more {
            events.truncate(limit as usize);
        }
        Ok((events, has_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::repositories::SessionRepository;
    use crate::db::schema::test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_has_more_pagination() {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();
        let store = EventStore::new(pool);

        for _ in 0..4 {
            store
                .append("s1", None, EventType::TaskProgress, &json!({}), EventSource::Session)
                .await
                .unwrap();
        }

        let (page, has_more) = store.get_events("s1", None, 3).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(has_more);

        let (rest, has_more) = store.get_events("s1", Some(3), 3).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(!has_more);
    }
}
