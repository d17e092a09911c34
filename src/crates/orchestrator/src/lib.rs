//! Run orchestration core for siteforge
//!
//! This crate coordinates everything between an incoming product request and
//! a finished multi-page static artifact: durable runs with a strict status
//! machine, the generation graph driven on FlowGraph with checkpointed
//! interrupts, a dependency scheduler + bounded parallel executor for
//! planner-produced task graphs, versioned product docs / pages / project
//! snapshots with pin-aware retention, an append-only per-session event log
//! streamed over SSE, and a tool policy engine consulted around tool calls.
//!
//! The crate deliberately does not author HTML, call model providers, or
//! touch the workspace file tree; those concerns live behind the collaborator
//! traits in [`graph::nodes`] and [`executor::task_executor`].

pub mod api;
pub mod config;
pub mod db;
pub mod events;
pub mod executor;
pub mod graph;
pub mod policy;
pub mod services;

use thiserror::Error;

/// Errors that can occur during orchestration
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A state transition or precondition was violated
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Pin limit reached; carries the ids currently pinned
    #[error("Pinned limit exceeded")]
    PinnedLimitExceeded { current_pinned: Vec<String> },

    /// Transient failure worth retrying (rate limit, transport, upstream 5xx)
    #[error("Temporary error: {0}")]
    Temporary(String),

    /// A wait deadline elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Cancellation was observed
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph runtime error
    #[error("Graph error: {0}")]
    Graph(#[from] flowgraph_core::GraphError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl OrchestratorError {
    /// Whether a task-level retry may help
    pub fn is_temporary(&self) -> bool {
        matches!(self, OrchestratorError::Temporary(_))
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Generate a short trace id attached to task and run failures
pub fn new_trace_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("tr-{}", &raw[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_shape() {
        let trace_id = new_trace_id();
        assert!(trace_id.starts_with("tr-"));
        assert_eq!(trace_id.len(), 15);
        assert_ne!(trace_id, new_trace_id());
    }

    #[test]
    fn test_temporary_classification() {
        assert!(OrchestratorError::Temporary("429".to_string()).is_temporary());
        assert!(!OrchestratorError::Validation("bad slug".to_string()).is_temporary());
    }
}
