//! Error types for graph construction and execution

use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while building or running a graph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A node body returned an error
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    /// Execution was parked by an interrupt
    ///
    /// Not a failure: the thread checkpointed and waits for a resume payload.
    #[error("Execution interrupted at node '{node}'")]
    Interrupted { node: String },

    /// Execution observed a cancellation marker
    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] flowgraph_checkpoint::CheckpointError),

    /// State (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A resume was requested but no checkpoint exists for the thread
    #[error("Nothing to resume for thread '{0}'")]
    NothingToResume(String),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    /// Build a node-execution error with context
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        GraphError::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Whether the executor may retry the failed node under its retry policy
    ///
    /// Interrupts, cancellation, and structural errors are never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GraphError::Interrupted { .. }
                | GraphError::Cancelled(_)
                | GraphError::Validation(_)
                | GraphError::NothingToResume(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_not_retryable() {
        let err = GraphError::Interrupted {
            node: "refine_gate".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cancelled_not_retryable() {
        assert!(!GraphError::Cancelled("run-1".to_string()).is_retryable());
    }

    #[test]
    fn test_node_execution_retryable() {
        assert!(GraphError::node_execution("generate", "upstream 503").is_retryable());
    }
}
