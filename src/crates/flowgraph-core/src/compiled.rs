//! Compiled graph execution
//!
//! A [`CompiledGraph`] drives a validated [`Graph`](crate::graph::Graph)
//! through its nodes one superstep at a time:
//!
//! 1. run the current node (under its retry policy),
//! 2. merge its update into the shared state,
//! 3. checkpoint state + the next-node cursor,
//! 4. follow the outgoing edge (evaluating the router for conditional edges).
//!
//! Execution is exposed as a stream of [`StreamUpdate`]s so callers can
//! forward progress while the graph runs. A node may return
//! [`NodeOutcome::Interrupt`](crate::node::NodeOutcome::Interrupt) to park the
//! thread: the executor checkpoints with the interrupting node as the cursor,
//! emits [`StreamUpdate::Interrupt`], and ends the stream. A later
//! [`GraphInput::Resume`] re-enters the same node with the resume payload
//! available in the state under [`RESUME_KEY`]; the key is stripped again once
//! that node completes.

use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, END};
use crate::node::{NodeOutcome, NodeSpec};
use async_stream::try_stream;
use flowgraph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// State key carrying the resume payload into a re-entered node
pub const RESUME_KEY: &str = "__resume__";

/// How an execution is started
#[derive(Debug, Clone)]
pub enum GraphInput {
    /// Begin a fresh execution with the given initial state (a JSON object)
    Start(serde_json::Value),

    /// Re-enter a parked thread with a resume payload
    Resume(serde_json::Value),
}

/// One streamed execution update
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    /// A node completed and contributed this partial state update
    Node {
        node: String,
        update: serde_json::Value,
    },

    /// A node parked the thread; the stream ends after this update
    Interrupt {
        node: String,
        payload: serde_json::Value,
    },
}

/// Boxed stream of execution updates
pub type GraphStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamUpdate>> + Send + 'a>>;

fn require_object(state: &serde_json::Value) -> Result<()> {
    if state.is_object() {
        Ok(())
    } else {
        Err(GraphError::Validation(
            "initial state must be a JSON object".to_string(),
        ))
    }
}

/// A validated graph ready for execution
pub struct CompiledGraph {
    graph: Graph,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph) -> Self {
        Self {
            graph,
            checkpointer: None,
        }
    }

    /// Attach a checkpointer; required for interrupt/resume support
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Whether a checkpointer is attached
    pub fn has_checkpointer(&self) -> bool {
        self.checkpointer.is_some()
    }

    /// Load the latest checkpointed state for a thread
    pub async fn get_state(&self, config: &CheckpointConfig) -> Result<Option<serde_json::Value>> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(None);
        };
        Ok(checkpointer
            .get_tuple(config)
            .await?
            .map(|tuple| tuple.checkpoint.state))
    }

    /// Execute the graph, streaming one update per completed node
    ///
    /// The stream ends after routing reaches `__end__`, after an interrupt,
    /// or on the first error.
    pub fn stream(&self, input: GraphInput, config: CheckpointConfig) -> GraphStream<'_> {
        Box::pin(try_stream! {
            let mut step: i64;
            let mut state: serde_json::Value;
            let mut current: String;

            match input {
                GraphInput::Start(initial) => {
                    require_object(&initial)?;
                    state = initial;
                    current = self.graph.entry()?.clone();
                    step = 0;
                    self.save_checkpoint(
                        &config,
                        &state,
                        step,
                        CheckpointSource::Input,
                        Some(&current),
                        None,
                    )
                    .await?;
                }
                GraphInput::Resume(payload) => {
                    let checkpointer = self.checkpointer.as_ref().ok_or_else(|| {
                        GraphError::Validation("resume requires a checkpointer".to_string())
                    })?;
                    let thread_id = config
                        .thread_id
                        .clone()
                        .unwrap_or_default();
                    let tuple = checkpointer
                        .get_tuple(&config)
                        .await?
                        .ok_or_else(|| GraphError::NothingToResume(thread_id.clone()))?;
                    let next = tuple
                        .metadata
                        .next_node
                        .clone()
                        .ok_or_else(|| GraphError::NothingToResume(thread_id))?;

                    state = tuple.checkpoint.state;
                    if let Some(map) = state.as_object_mut() {
                        map.insert(RESUME_KEY.to_string(), payload);
                    }
                    current = next;
                    step = tuple.metadata.step + 1;
                    self.save_checkpoint(
                        &config,
                        &state,
                        step,
                        CheckpointSource::Resume,
                        Some(&current),
                        None,
                    )
                    .await?;
                }
            }

            while current != END {
                let spec = self.graph.nodes.get(&current).ok_or_else(|| {
                    GraphError::Validation(format!("node '{current}' does not exist"))
                })?;

                let outcome = self.run_node(spec, state.clone()).await?;

                match outcome {
                    NodeOutcome::Interrupt(payload) => {
                        self.save_checkpoint(
                            &config,
                            &state,
                            step,
                            CheckpointSource::Interrupt,
                            Some(&current),
                            Some(payload.clone()),
                        )
                        .await?;
                        yield StreamUpdate::Interrupt {
                            node: current.clone(),
                            payload,
                        };
                        return;
                    }
                    NodeOutcome::Update(update) => {
                        if let Some(map) = state.as_object_mut() {
                            for (key, value) in update.clone() {
                                map.insert(key, value);
                            }
                            map.remove(RESUME_KEY);
                        }

                        let next = self.next_node(&current, &state)?;
                        step += 1;
                        let next_for_checkpoint = (next != END).then(|| next.clone());
                        self.save_checkpoint(
                            &config,
                            &state,
                            step,
                            CheckpointSource::Loop,
                            next_for_checkpoint.as_deref(),
                            None,
                        )
                        .await?;

                        yield StreamUpdate::Node {
                            node: current.clone(),
                            update: serde_json::Value::Object(update),
                        };
                        current = next;
                    }
                }
            }
        })
    }

    /// Execute to completion and return the final state
    ///
    /// Fails with [`GraphError::Interrupted`] if a node parks the thread.
    pub async fn invoke(
        &self,
        input: GraphInput,
        config: CheckpointConfig,
    ) -> Result<serde_json::Value> {
        use futures::StreamExt;

        let mut state = match &input {
            GraphInput::Start(initial) => initial.clone(),
            GraphInput::Resume(_) => self
                .get_state(&config)
                .await?
                .ok_or_else(|| {
                    GraphError::NothingToResume(config.thread_id.clone().unwrap_or_default())
                })?,
        };

        let mut stream = self.stream(input, config);
        while let Some(update) = stream.next().await {
            match update? {
                StreamUpdate::Node { update, .. } => {
                    if let (Some(map), Some(patch)) = (state.as_object_mut(), update.as_object()) {
                        for (key, value) in patch {
                            map.insert(key.clone(), value.clone());
                        }
                        map.remove(RESUME_KEY);
                    }
                }
                StreamUpdate::Interrupt { node, .. } => {
                    return Err(GraphError::Interrupted { node });
                }
            }
        }
        Ok(state)
    }

    /// Run one node under its retry policy
    async fn run_node(&self, spec: &NodeSpec, state: serde_json::Value) -> Result<NodeOutcome> {
        let mut attempts: u32 = 0;
        loop {
            match (spec.executor)(state.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    attempts += 1;
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    let Some(policy) = &spec.retry else {
                        return Err(self.wrap_node_error(&spec.name, err));
                    };
                    if !policy.should_retry(attempts) {
                        return Err(self.wrap_node_error(&spec.name, err));
                    }
                    let delay = policy.calculate_delay(attempts - 1);
                    tracing::warn!(
                        node = %spec.name,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "node failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn wrap_node_error(&self, node: &str, err: GraphError) -> GraphError {
        match err {
            GraphError::NodeExecution { .. } => err,
            other => GraphError::node_execution(node, other.to_string()),
        }
    }

    /// Resolve the outgoing edge of `current` against the given state
    fn next_node(&self, current: &str, state: &serde_json::Value) -> Result<String> {
        match self.graph.edges.get(current) {
            Some(Edge::Direct(target)) => Ok(target.clone()),
            Some(Edge::Conditional { router, branches }) => {
                let key = router(state);
                branches.get(&key).cloned().ok_or_else(|| {
                    GraphError::Validation(format!(
                        "router for '{current}' returned unknown branch '{key}'"
                    ))
                })
            }
            None => Err(GraphError::Validation(format!(
                "node '{current}' has no outgoing edge"
            ))),
        }
    }

    async fn save_checkpoint(
        &self,
        config: &CheckpointConfig,
        state: &serde_json::Value,
        step: i64,
        source: CheckpointSource,
        next_node: Option<&str>,
        interrupt: Option<serde_json::Value>,
    ) -> Result<()> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(());
        };
        let mut metadata =
            CheckpointMetadata::new(step, source, next_node.map(|node| node.to_string()));
        if let Some(payload) = interrupt {
            metadata = metadata.with_interrupt(payload);
        }
        let lookup = CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: None,
        };
        checkpointer
            .put(&lookup, Checkpoint::new(state.clone()), metadata)
            .await?;
        Ok(())
    }
}
