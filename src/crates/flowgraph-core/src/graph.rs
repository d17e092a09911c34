//! Graph structure: nodes, edges, and validation
//!
//! A [`Graph`] is a static directed graph over named nodes. Edges are either
//! [`Edge::Direct`] (unconditional) or [`Edge::Conditional`] (a pure router
//! function over the current state selects one of a declared set of
//! branches). The special ids [`START`] and [`END`] mark the boundaries of
//! execution and never correspond to real nodes.
//!
//! Build a graph with [`Graph::add_node`] / [`Graph::add_edge`] /
//! [`Graph::add_conditional_edge`], then call [`Graph::compile`] to obtain a
//! runnable [`CompiledGraph`](crate::compiled::CompiledGraph).

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::node::NodeSpec;
use std::collections::HashMap;
use std::sync::Arc;

/// Node identifier within a graph
pub type NodeId = String;

/// Virtual entry marker; the single edge out of `START` selects the entry node
pub const START: &str = "__start__";

/// Virtual exit marker; routing to `END` finishes the execution
pub const END: &str = "__end__";

/// Router function for conditional edges
///
/// Must be a pure function of the state: it returns a branch key and must not
/// mutate anything.
pub type EdgeRouter = Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>;

/// Control-flow edge out of a node
#[derive(Clone)]
pub enum Edge {
    /// Unconditional edge to a specific node
    Direct(NodeId),

    /// Conditional edge: `router(state)` picks a key in `branches`
    Conditional {
        router: EdgeRouter,
        /// Map of branch keys to target nodes, used for routing and validation
        branches: HashMap<String, NodeId>,
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

/// Static graph of named nodes and control-flow edges
#[derive(Default)]
pub struct Graph {
    /// Node definitions keyed by id
    pub nodes: HashMap<NodeId, NodeSpec>,

    /// Outgoing edge per node (including the edge out of [`START`])
    pub edges: HashMap<NodeId, Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph, replacing any previous definition
    pub fn add_node(&mut self, spec: NodeSpec) {
        self.nodes.insert(spec.name.clone(), spec);
    }

    /// Add an unconditional edge
    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
    }

    /// Add a conditional edge
    ///
    /// `router` receives the current state and returns a key of `branches`.
    pub fn add_conditional_edge(
        &mut self,
        from: impl Into<NodeId>,
        router: EdgeRouter,
        branches: HashMap<String, NodeId>,
    ) {
        self.edges
            .insert(from.into(), Edge::Conditional { router, branches });
    }

    /// The entry node, i.e. the target of the edge out of [`START`]
    pub fn entry(&self) -> Result<&NodeId> {
        match self.edges.get(START) {
            Some(Edge::Direct(target)) => Ok(target),
            Some(Edge::Conditional { .. }) => Err(GraphError::Validation(
                "entry edge must be unconditional".to_string(),
            )),
            None => Err(GraphError::Validation(
                "graph has no entry edge from __start__".to_string(),
            )),
        }
    }

    /// Validate the graph structure
    ///
    /// Returns an error if the entry edge is missing, an edge source or
    /// target does not exist, or a node other than the ones routing to
    /// [`END`] has no outgoing edge.
    pub fn validate(&self) -> Result<()> {
        self.entry()?;

        for (from, edge) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "edge source '{from}' does not exist"
                )));
            }
            match edge {
                Edge::Direct(to) => {
                    if to != END && !self.nodes.contains_key(to) {
                        return Err(GraphError::Validation(format!(
                            "edge target '{to}' does not exist"
                        )));
                    }
                }
                Edge::Conditional { branches, .. } => {
                    if branches.is_empty() {
                        return Err(GraphError::Validation(format!(
                            "conditional edge from '{from}' has no branches"
                        )));
                    }
                    for to in branches.values() {
                        if to != END && !self.nodes.contains_key(to) {
                            return Err(GraphError::Validation(format!(
                                "branch target '{to}' does not exist"
                            )));
                        }
                    }
                }
            }
        }

        for name in self.nodes.keys() {
            if !self.edges.contains_key(name) {
                return Err(GraphError::Validation(format!(
                    "node '{name}' has no outgoing edge"
                )));
            }
        }

        Ok(())
    }

    /// Validate and produce a runnable graph
    pub fn compile(self) -> Result<CompiledGraph> {
        self.validate()?;
        Ok(CompiledGraph::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeOutcome, NodeSpec};
    use serde_json::Map;

    fn noop_node(name: &str) -> NodeSpec {
        NodeSpec::new(name, |_state| {
            Box::pin(async move { Ok(NodeOutcome::Update(Map::new())) })
        })
    }

    #[test]
    fn test_validate_missing_entry() {
        let mut graph = Graph::new();
        graph.add_node(noop_node("a"));
        graph.add_edge("a", END);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_target() {
        let mut graph = Graph::new();
        graph.add_node(noop_node("a"));
        graph.add_edge(START, "a");
        graph.add_edge("a", "ghost");
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_dangling_node() {
        let mut graph = Graph::new();
        graph.add_node(noop_node("a"));
        graph.add_node(noop_node("b"));
        graph.add_edge(START, "a");
        graph.add_edge("a", END);
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("no outgoing edge"));
    }

    #[test]
    fn test_validate_conditional_branches() {
        let mut graph = Graph::new();
        graph.add_node(noop_node("a"));
        graph.add_edge(START, "a");
        let mut branches = HashMap::new();
        branches.insert("done".to_string(), END.to_string());
        graph.add_conditional_edge("a", Arc::new(|_| "done".to_string()), branches);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_entry_resolution() {
        let mut graph = Graph::new();
        graph.add_node(noop_node("first"));
        graph.add_edge(START, "first");
        graph.add_edge("first", END);
        assert_eq!(graph.entry().unwrap(), "first");
    }
}
