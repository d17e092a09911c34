//! Checkpoint data structures for state persistence and resumption
//!
//! A [`Checkpoint`] captures the complete graph state at a superstep boundary
//! together with the cursor needed to continue execution: the name of the next
//! node to run. Checkpoints are identified by a [`CheckpointConfig`] (thread id
//! plus optional checkpoint id) and carry [`CheckpointMetadata`] describing how
//! they were produced.
//!
//! Each execution thread (one per run) accumulates an independent checkpoint
//! history; resuming a thread loads the latest checkpoint and continues from
//! its recorded cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Where a checkpoint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Written when the graph receives its initial input
    Input,
    /// Written after a node completed during the main loop
    Loop,
    /// Written when an interrupt parked the thread
    Interrupt,
    /// Written when a resume payload re-entered the thread
    Resume,
}

/// A complete snapshot of graph state at a superstep boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint identifier
    pub id: String,

    /// Creation timestamp
    pub ts: DateTime<Utc>,

    /// The full state map as last merged by the executor
    pub state: serde_json::Value,
}

impl Checkpoint {
    /// Create a checkpoint over the given state with a generated id
    pub fn new(state: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            state,
        }
    }
}

/// Identifies a checkpoint location within a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Execution thread identifier (required for all operations)
    pub thread_id: Option<String>,

    /// Optional namespace for partitioning checkpoints within a thread
    pub checkpoint_ns: Option<String>,

    /// Specific checkpoint id; `None` selects the latest for the thread
    pub checkpoint_id: Option<String>,
}

impl CheckpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_checkpoint_ns(mut self, ns: impl Into<String>) -> Self {
        self.checkpoint_ns = Some(ns.into());
        self
    }

    pub fn with_checkpoint_id(mut self, id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(id.into());
        self
    }

    /// The thread id, or an `Invalid` error when missing
    pub fn require_thread_id(&self) -> crate::error::Result<&str> {
        self.thread_id
            .as_deref()
            .ok_or_else(|| crate::error::CheckpointError::Invalid("thread_id is required".to_string()))
    }
}

/// Metadata recorded alongside each checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Superstep number within the execution (0-based)
    pub step: i64,

    /// How this checkpoint was produced
    pub source: CheckpointSource,

    /// Name of the node the executor will run next; `None` means the thread
    /// finished
    pub next_node: Option<String>,

    /// Pending interrupt payload when `source` is `Interrupt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<serde_json::Value>,

    /// Free-form extra metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new(step: i64, source: CheckpointSource, next_node: Option<String>) -> Self {
        Self {
            step,
            source,
            next_node,
            interrupt: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_interrupt(mut self, payload: serde_json::Value) -> Self {
        self.interrupt = Some(payload);
        self
    }
}

/// A checkpoint together with its identifying config and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointTuple {
    /// Config identifying the stored checkpoint (with the real checkpoint id)
    pub config: CheckpointConfig,

    /// The checkpointed state
    pub checkpoint: Checkpoint,

    /// Execution metadata
    pub metadata: CheckpointMetadata,

    /// Config of the previous checkpoint on the same thread, when any
    pub parent_config: Option<CheckpointConfig>,
}
