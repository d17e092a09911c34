//! Run model: one durable unit of orchestrator work

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Run lifecycle status
///
/// ```text
///   queued -> running -> waiting_input -> running -> completed
///                   \-> failed
///                   \-> cancelled          waiting_input -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    WaitingInput,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::WaitingInput => "waiting_input",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(RunStatus::Queued),
            "running" => Some(RunStatus::Running),
            "waiting_input" => Some(RunStatus::WaitingInput),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// The transition matrix; everything not listed is a state conflict
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, WaitingInput)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (WaitingInput, Running)
                | (WaitingInput, Cancelled)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run row; bound to one user request and one checkpoint thread
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Run {
    /// Unique run identifier (UUID string)
    pub id: String,

    pub session_id: String,

    /// Run that spawned this one, when any
    pub parent_run_id: Option<String>,

    /// What initiated the run (e.g. "chat")
    pub trigger_source: String,

    /// Current status; see [`RunStatus`]
    pub status: String,

    /// The user message that opened the run
    pub input_message: String,

    /// Last resume payload as JSON text
    pub resume_payload: Option<String>,

    /// Checkpointer thread key; defaults to "{session_id}:{run_id}"
    pub checkpoint_thread: String,
    pub checkpoint_ns: Option<String>,

    /// Last error as JSON text ({"message": ..., "trace_id": ...})
    pub latest_error: Option<String>,

    /// Request context and counters as JSON text
    pub metrics: Option<String>,

    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Run {
    /// Typed status; `Queued` if the column holds an unknown value
    pub fn run_status(&self) -> RunStatus {
        RunStatus::parse(&self.status).unwrap_or(RunStatus::Queued)
    }

    pub fn is_terminal(&self) -> bool {
        self.run_status().is_terminal()
    }
}
