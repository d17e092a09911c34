//! Session event model: one row per emitted event

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which subsystem emitted the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Session,
    Plan,
    Task,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Session => "session",
            EventSource::Plan => "plan",
            EventSource::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "session" => Some(EventSource::Session),
            "plan" => Some(EventSource::Plan),
            "task" => Some(EventSource::Task),
            _ => None,
        }
    }
}

/// An appended event; `seq` is strictly increasing and gap-free per session
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionEvent {
    pub id: i64,
    pub session_id: String,

    /// Run correlation, when the event belongs to a run
    pub run_id: Option<String>,

    /// Unique per session
    pub event_id: String,

    pub seq: i64,

    /// Event type string (see `events::types::EventType`)
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,

    /// JSON payload text
    pub payload: Option<String>,

    pub source: String,
    pub created_at: String,
}

impl SessionEvent {
    /// Parsed payload; empty object when missing or unparsable
    pub fn payload_value(&self) -> serde_json::Value {
        self.payload
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| serde_json::json!({}))
    }
}
