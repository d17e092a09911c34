//! FlowGraph - a checkpointing executor for static node graphs
//!
//! This crate provides the execution substrate used by the siteforge
//! orchestrator: a directed graph of named async nodes with conditional
//! routing, per-node retry policies, durable checkpoints after every
//! superstep, and interrupt/resume semantics for human-in-the-loop steps.
//!
//! # Example
//!
//! ```rust,ignore
//! use flowgraph_core::{Graph, NodeSpec, NodeOutcome, GraphInput, START, END};
//! use flowgraph_checkpoint::{CheckpointConfig, InMemoryCheckpointSaver};
//! use std::sync::Arc;
//!
//! let mut graph = Graph::new();
//! graph.add_node(NodeSpec::new("greet", |state| Box::pin(async move {
//!     let mut update = serde_json::Map::new();
//!     update.insert("greeting".into(), "hello".into());
//!     Ok(NodeOutcome::Update(update))
//! })));
//! graph.add_edge(START, "greet");
//! graph.add_edge("greet", END);
//!
//! let compiled = graph.compile()?
//!     .with_checkpointer(Arc::new(InMemoryCheckpointSaver::new()));
//! let config = CheckpointConfig::new().with_thread_id("thread-1");
//! let final_state = compiled.invoke(
//!     GraphInput::Start(serde_json::json!({})),
//!     config,
//! ).await?;
//! ```

pub mod compiled;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod llm;
pub mod node;
pub mod retry;

pub use compiled::{CompiledGraph, GraphInput, GraphStream, StreamUpdate, RESUME_KEY};
pub use error::{GraphError, Result};
pub use graph::{Edge, EdgeRouter, Graph, NodeId, END, START};
pub use interrupt::Interrupt;
pub use node::{NodeExecutor, NodeFuture, NodeOutcome, NodeSpec};
pub use retry::{RetryPolicy, RetryState};
