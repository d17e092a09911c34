//! In-process event emitter
//!
//! The emitter is the single place run-time code emits events. Each emit is
//! written durably through the [`EventStore`] and buffered in-process; the
//! orchestrator and the parallel executor drain the buffer with
//! [`EventEmitter::events_since`] between steps and forward new records to
//! their callers. A failed store write is logged and the event still reaches
//! in-process listeners (with `seq` 0, since no sequence was assigned).

use crate::db::models::{now_rfc3339, EventSource, SessionEvent};
use crate::events::store::EventStore;
use crate::events::types::EventType;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The event envelope surfaced to listeners and API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
    pub run_id: Option<String>,
    pub event_id: String,
    pub seq: i64,
    pub payload: serde_json::Value,
    pub source: String,
    pub created_at: String,
}

impl From<SessionEvent> for EventRecord {
    fn from(event: SessionEvent) -> Self {
        let payload = event.payload_value();
        EventRecord {
            event_type: event.event_type,
            session_id: event.session_id,
            run_id: event.run_id,
            event_id: event.event_id,
            seq: event.seq,
            payload,
            source: event.source,
            created_at: event.created_at,
        }
    }
}

/// Buffering emitter bound to one session
pub struct EventEmitter {
    store: EventStore,
    session_id: String,
    run_id: Mutex<Option<String>>,
    buffer: Mutex<Vec<EventRecord>>,
}

impl EventEmitter {
    pub fn new(store: EventStore, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            run_id: Mutex::new(None),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Set the run id attached to subsequently emitted events
    pub fn set_run_id(&self, run_id: Option<String>) {
        *self.run_id.lock() = run_id;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Emit a session-sourced event
    pub async fn emit(&self, event_type: EventType, payload: serde_json::Value) {
        self.emit_from(event_type, payload, EventSource::Session).await;
    }

    /// Emit an event with an explicit source tag
    pub async fn emit_from(
        &self,
        event_type: EventType,
        payload: serde_json::Value,
        source: EventSource,
    ) {
        let run_id = self.run_id.lock().clone();
        let record = match self
            .store
            .append(&self.session_id, run_id.as_deref(), event_type, &payload, source)
            .await
        {
            Ok(row) => EventRecord::from(row),
            Err(error) => {
                tracing::error!(
                    session_id = %self.session_id,
                    event_type = %event_type,
                    %error,
                    "durable event write failed; surfacing to in-process listeners only"
                );
                EventRecord {
                    event_type: event_type.as_str().to_string(),
                    session_id: self.session_id.clone(),
                    run_id,
                    event_id: Uuid::new_v4().to_string(),
                    seq: 0,
                    payload,
                    source: source.as_str().to_string(),
                    created_at: now_rfc3339(),
                }
            }
        };
        self.buffer.lock().push(record);
    }

    /// Drain events buffered past `index`, returning them and the new index
    pub fn events_since(&self, index: usize) -> (Vec<EventRecord>, usize) {
        let buffer = self.buffer.lock();
        let new_index = buffer.len();
        if index >= new_index {
            return (Vec::new(), new_index);
        }
        (buffer[index..].to_vec(), new_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::repositories::SessionRepository;
    use crate::db::schema::test_pool;
    use serde_json::json;

    async fn emitter() -> EventEmitter {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();
        EventEmitter::new(EventStore::new(pool), "s1")
    }

    #[tokio::test]
    async fn test_emit_buffers_and_persists() {
        let emitter = emitter().await;
        emitter.set_run_id(Some("r1".to_string()));
        emitter
            .emit(EventType::RunStarted, json!({"status": "running"}))
            .await;

        let (events, index) = emitter.events_since(0);
        assert_eq!(index, 1);
        assert_eq!(events[0].event_type, "run_started");
        assert_eq!(events[0].run_id.as_deref(), Some("r1"));
        assert_eq!(events[0].seq, 1);
    }

    #[tokio::test]
    async fn test_events_since_is_incremental() {
        let emitter = emitter().await;
        emitter.emit(EventType::BriefStart, json!({})).await;
        emitter.emit(EventType::BriefComplete, json!({})).await;

        let (first, index) = emitter.events_since(0);
        assert_eq!(first.len(), 2);

        emitter.emit(EventType::Done, json!({})).await;
        let (second, index) = emitter.events_since(index);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event_type, "done");
        assert_eq!(index, 3);
    }

    #[tokio::test]
    async fn test_store_failure_still_surfaces_event() {
        let pool = test_pool().await;
        // No session row: the foreign key makes the durable write fail.
        let emitter = EventEmitter::new(EventStore::new(pool), "ghost");
        emitter.emit(EventType::Error, json!({"message": "boom"})).await;

        let (events, _) = emitter.events_since(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 0);
    }
}
