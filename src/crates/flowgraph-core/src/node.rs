//! Node definitions and execution outcomes

use crate::error::Result;
use crate::retry::RetryPolicy;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a node produced when it ran
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// Partial state update, merged shallowly into the shared state
    Update(serde_json::Map<String, serde_json::Value>),

    /// Park the thread and wait for caller-supplied input
    ///
    /// The payload is surfaced to the caller verbatim; on resume the same
    /// node runs again with the resume payload available under `__resume__`.
    Interrupt(serde_json::Value),
}

/// Boxed future returned by a node body
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeOutcome>> + Send>>;

/// Node body: an async function from the full state to an outcome
pub type NodeExecutor = Arc<dyn Fn(serde_json::Value) -> NodeFuture + Send + Sync>;

/// A named node with its body and retry policy
#[derive(Clone)]
pub struct NodeSpec {
    /// Unique node name within the graph
    pub name: String,

    /// Async body invoked with a clone of the current state
    pub executor: NodeExecutor,

    /// Retry policy for transient body failures; `None` means one attempt
    pub retry: Option<RetryPolicy>,
}

impl NodeSpec {
    /// Create a node from a closure returning a boxed future
    pub fn new<F>(name: impl Into<String>, executor: F) -> Self
    where
        F: Fn(serde_json::Value) -> NodeFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            executor: Arc::new(executor),
            retry: None,
        }
    }

    /// Attach a retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("executor", &"<function>")
            .field("retry", &self.retry)
            .finish()
    }
}
