//! API response record types
//!
//! Thin serializable views over the row models. Run responses are the bodies
//! cached by the idempotency layer, so their serialization must stay stable.

use crate::db::models::{Run, RunStatus, SessionEvent};
use crate::events::EventRecord;
use serde::{Deserialize, Serialize};

/// Run record returned by every run endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    pub session_id: String,
    pub status: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub latest_error: Option<serde_json::Value>,
    pub metrics: Option<serde_json::Value>,
    pub checkpoint_thread: String,
    pub checkpoint_ns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_reason: Option<String>,
}

impl From<Run> for RunResponse {
    fn from(run: Run) -> Self {
        let latest_error: Option<serde_json::Value> = run
            .latest_error
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        let waiting_reason = if run.run_status() == RunStatus::WaitingInput {
            latest_error
                .as_ref()
                .and_then(|error| error.get("waiting_reason").or_else(|| error.get("reason")))
                .and_then(|value| value.as_str())
                .map(|value| value.to_string())
        } else {
            None
        };
        RunResponse {
            run_id: run.id,
            session_id: run.session_id,
            status: run.status,
            started_at: run.started_at,
            finished_at: run.finished_at,
            latest_error,
            metrics: run
                .metrics
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            checkpoint_thread: run.checkpoint_thread,
            checkpoint_ns: run.checkpoint_ns,
            waiting_reason,
        }
    }
}

/// Paginated event listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
    pub last_seq: i64,
    pub has_more: bool,
}

impl EventsResponse {
    pub fn new(events: Vec<SessionEvent>, since_seq: Option<i64>, has_more: bool) -> Self {
        let events: Vec<EventRecord> = events.into_iter().map(EventRecord::from).collect();
        let last_seq = events
            .last()
            .map(|event| event.seq)
            .unwrap_or_else(|| since_seq.unwrap_or(0));
        Self {
            events,
            last_seq,
            has_more,
        }
    }
}
