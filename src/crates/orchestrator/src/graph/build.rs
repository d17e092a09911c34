//! Static wiring of the generation graph
//!
//! ```text
//! mcp_setup -> brief -> style_extractor -> component_registry -> generate
//!     generate      -(aesthetic? )-> aesthetic_scorer -> refine_gate
//!                   -(otherwise  )-> refine_gate
//!     refine_gate   -(feedback?  )-> refine -> verify
//!                   -(otherwise  )-> verify
//!     verify        -(pass       )-> render -> end
//!                   -(fail       )-> refine_gate
//! ```
//!
//! Every node is wrapped to poll the cancellation registry at entry and exit
//! and to emit start/progress/complete events with a node-specific payload
//! extractor. I/O nodes carry a 2-attempt retry policy, LLM nodes 3 attempts.
//! Conditional predicates are pure functions of the state.

use crate::events::EventType;
use crate::graph::nodes::{self, ensure_not_cancelled, NodeContext};
use crate::graph::state::GraphState;
use crate::OrchestratorError;
use flowgraph_checkpoint::CheckpointSaver;
use flowgraph_core::{
    CompiledGraph, Graph, GraphError, NodeOutcome, NodeSpec, RetryPolicy, END, START,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

fn io_retry() -> RetryPolicy {
    RetryPolicy::new(2).with_initial_interval(0.5)
}

fn llm_retry() -> RetryPolicy {
    RetryPolicy::new(3).with_initial_interval(0.5)
}

/// Event hooks around one node
#[derive(Clone, Copy, Default)]
struct NodeEvents {
    start: Option<(EventType, fn() -> Value)>,
    progress: Option<(EventType, fn() -> Value)>,
    complete: Option<fn(&Map<String, Value>) -> (EventType, Value)>,
}

fn empty_payload() -> Value {
    json!({})
}

fn brief_complete(_update: &Map<String, Value>) -> (EventType, Value) {
    (EventType::BriefComplete, json!({}))
}

fn style_complete(update: &Map<String, Value>) -> (EventType, Value) {
    let has_tokens = update
        .get("style_tokens")
        .map(|tokens| !tokens.is_null())
        .unwrap_or(false);
    (EventType::StyleExtracted, json!({"has_tokens": has_tokens}))
}

fn registry_complete(update: &Map<String, Value>) -> (EventType, Value) {
    let components = update
        .get("component_registry")
        .and_then(|registry| registry.get("components"))
        .and_then(|components| components.as_array())
        .map(|components| components.len())
        .unwrap_or(0);
    (EventType::RegistryComplete, json!({"components": components}))
}

fn schema_count(update: &Map<String, Value>) -> usize {
    update
        .get("page_schemas")
        .and_then(|schemas| schemas.as_array())
        .map(|schemas| schemas.len())
        .unwrap_or(0)
}

fn generate_complete(update: &Map<String, Value>) -> (EventType, Value) {
    (EventType::GenerateComplete, json!({"pages": schema_count(update)}))
}

fn generate_progress() -> Value {
    json!({"step": "Generating schemas", "percent": 50, "message": "Generating page schemas"})
}

fn refine_complete(update: &Map<String, Value>) -> (EventType, Value) {
    (EventType::RefineComplete, json!({"pages": schema_count(update)}))
}

fn verify_start() -> Value {
    json!({"checks": ["build", "structure", "mobile", "security"]})
}

fn verify_complete(update: &Map<String, Value>) -> (EventType, Value) {
    let report = update.get("verify_report").cloned().unwrap_or(json!({}));
    let blocked = update
        .get("verify_blocked")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    if blocked {
        (
            EventType::VerifyFail,
            json!({"report": report, "action": "waiting_input"}),
        )
    } else {
        (EventType::VerifyPass, json!({"report": report}))
    }
}

fn to_graph_error(node: &str, error: OrchestratorError) -> GraphError {
    match error {
        OrchestratorError::Cancelled(message) => GraphError::Cancelled(message),
        other => GraphError::node_execution(node, other.to_string()),
    }
}

/// Wrap a node body with cancellation polls and event emission
fn wrap_node<F, Fut>(
    ctx: Arc<NodeContext>,
    name: &'static str,
    events: NodeEvents,
    body: F,
) -> NodeSpec
where
    F: Fn(Arc<NodeContext>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<NodeOutcome>> + Send + 'static,
{
    let body = Arc::new(body);
    NodeSpec::new(name, move |state: Value| {
        let ctx = ctx.clone();
        let body = body.clone();
        Box::pin(async move {
            ensure_not_cancelled(&state).map_err(|error| to_graph_error(name, error))?;

            if let Some((event_type, payload)) = events.start {
                ctx.emitter.emit(event_type, payload()).await;
            }
            if let Some((event_type, payload)) = events.progress {
                ctx.emitter.emit(event_type, payload()).await;
            }

            let outcome = body(ctx.clone(), state.clone())
                .await
                .map_err(|error| to_graph_error(name, error))?;

            ensure_not_cancelled(&state).map_err(|error| to_graph_error(name, error))?;

            match outcome {
                NodeOutcome::Update(mut update) => {
                    update
                        .entry("current_node".to_string())
                        .or_insert_with(|| Value::String(name.to_string()));
                    if let Some(complete) = events.complete {
                        let (event_type, payload) = complete(&update);
                        ctx.emitter.emit(event_type, payload).await;
                    }
                    Ok(NodeOutcome::Update(update))
                }
                interrupt => Ok(interrupt),
            }
        })
    })
}

const AESTHETIC_PRODUCT_TYPES: &[&str] = &["landing", "card", "invitation"];

fn should_score_aesthetic(raw: &Value) -> String {
    let state = GraphState::from_value(raw);
    if !state.aesthetic_enabled {
        return "skip".to_string();
    }
    match state.product_type() {
        Some(product_type) if AESTHETIC_PRODUCT_TYPES.contains(&product_type) => {
            "aesthetic".to_string()
        }
        _ => "skip".to_string(),
    }
}

fn should_refine(raw: &Value) -> String {
    let has_feedback = raw
        .get("user_feedback")
        .map(|value| match value {
            Value::String(text) => !text.is_empty(),
            Value::Null => false,
            _ => true,
        })
        .unwrap_or(false);
    if has_feedback {
        "refine".to_string()
    } else {
        "render".to_string()
    }
}

fn should_verify(verify_gate_enabled: bool) -> impl Fn(&Value) -> String + Send + Sync {
    move |raw: &Value| {
        if !verify_gate_enabled {
            return "pass".to_string();
        }
        let blocked = raw
            .get("verify_blocked")
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if blocked {
            "fail".to_string()
        } else {
            "pass".to_string()
        }
    }
}

/// Build and compile the generation graph
pub fn create_generation_graph(
    ctx: Arc<NodeContext>,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
) -> flowgraph_core::Result<CompiledGraph> {
    let mut graph = Graph::new();

    graph.add_node(
        wrap_node(ctx.clone(), "mcp_setup", NodeEvents::default(), |ctx, state| async move {
            nodes::mcp_setup_node(&ctx, &state).await
        })
        .with_retry(io_retry()),
    );
    graph.add_node(wrap_node(
        ctx.clone(),
        "brief",
        NodeEvents {
            start: Some((EventType::BriefStart, empty_payload)),
            complete: Some(brief_complete),
            ..Default::default()
        },
        |ctx, state| async move { nodes::brief_node(&ctx, &state).await },
    ));
    graph.add_node(
        wrap_node(
            ctx.clone(),
            "style_extractor",
            NodeEvents {
                complete: Some(style_complete),
                ..Default::default()
            },
            |ctx, state| async move { nodes::style_extractor_node(&ctx, &state).await },
        )
        .with_retry(llm_retry()),
    );
    graph.add_node(
        wrap_node(
            ctx.clone(),
            "component_registry",
            NodeEvents {
                start: Some((EventType::RegistryStart, empty_payload)),
                complete: Some(registry_complete),
                ..Default::default()
            },
            |ctx, state| async move { nodes::component_registry_node(&ctx, &state).await },
        )
        .with_retry(llm_retry()),
    );
    graph.add_node(
        wrap_node(
            ctx.clone(),
            "generate",
            NodeEvents {
                start: Some((EventType::GenerateStart, empty_payload)),
                progress: Some((EventType::GenerateProgress, generate_progress)),
                complete: Some(generate_complete),
            },
            |ctx, state| async move { nodes::generate_node(&ctx, &state).await },
        )
        .with_retry(io_retry()),
    );
    graph.add_node(
        wrap_node(
            ctx.clone(),
            "aesthetic_scorer",
            NodeEvents::default(),
            |ctx, state| async move { nodes::aesthetic_scorer_node(&ctx, &state).await },
        )
        .with_retry(llm_retry()),
    );
    graph.add_node(wrap_node(
        ctx.clone(),
        "refine_gate",
        NodeEvents::default(),
        |ctx, state| async move { nodes::refine_gate_node(&ctx, &state).await },
    ));
    graph.add_node(wrap_node(
        ctx.clone(),
        "refine",
        NodeEvents {
            start: Some((EventType::RefineStart, empty_payload)),
            complete: Some(refine_complete),
            ..Default::default()
        },
        |ctx, state| async move { nodes::refine_node(&ctx, &state).await },
    ));
    graph.add_node(wrap_node(
        ctx.clone(),
        "verify",
        NodeEvents {
            start: Some((EventType::VerifyStart, verify_start)),
            complete: Some(verify_complete),
            ..Default::default()
        },
        |ctx, state| async move { nodes::verify_node(&ctx, &state).await },
    ));
    graph.add_node(
        wrap_node(ctx.clone(), "render", NodeEvents::default(), |ctx, state| async move {
            nodes::render_node(&ctx, &state).await
        })
        .with_retry(io_retry()),
    );

    graph.add_edge(START, "mcp_setup");
    graph.add_edge("mcp_setup", "brief");
    graph.add_edge("brief", "style_extractor");
    graph.add_edge("style_extractor", "component_registry");
    graph.add_edge("component_registry", "generate");

    let mut aesthetic_branches = HashMap::new();
    aesthetic_branches.insert("aesthetic".to_string(), "aesthetic_scorer".to_string());
    aesthetic_branches.insert("skip".to_string(), "refine_gate".to_string());
    graph.add_conditional_edge("generate", Arc::new(should_score_aesthetic), aesthetic_branches);
    graph.add_edge("aesthetic_scorer", "refine_gate");

    let mut refine_branches = HashMap::new();
    refine_branches.insert("refine".to_string(), "refine".to_string());
    refine_branches.insert("render".to_string(), "verify".to_string());
    graph.add_conditional_edge("refine_gate", Arc::new(should_refine), refine_branches);
    graph.add_edge("refine", "verify");

    let mut verify_branches = HashMap::new();
    verify_branches.insert("pass".to_string(), "render".to_string());
    verify_branches.insert("fail".to_string(), "refine_gate".to_string());
    graph.add_conditional_edge(
        "verify",
        Arc::new(should_verify(ctx.settings.verify_gate_enabled)),
        verify_branches,
    );
    graph.add_edge("render", END);

    let compiled = graph.compile()?;
    Ok(match checkpointer {
        Some(checkpointer) => compiled.with_checkpointer(checkpointer),
        None => compiled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_should_score_aesthetic_gating() {
        let eligible = json!({
            "aesthetic_enabled": true,
            "product_doc": {"product_type": "landing"},
        });
        assert_eq!(should_score_aesthetic(&eligible), "aesthetic");

        let wrong_type = json!({
            "aesthetic_enabled": true,
            "product_doc": {"product_type": "dashboard"},
        });
        assert_eq!(should_score_aesthetic(&wrong_type), "skip");

        let disabled = json!({
            "aesthetic_enabled": false,
            "product_doc": {"product_type": "landing"},
        });
        assert_eq!(should_score_aesthetic(&disabled), "skip");
    }

    #[test]
    fn test_should_refine_on_feedback() {
        assert_eq!(should_refine(&json!({"user_feedback": "tighter"})), "refine");
        assert_eq!(should_refine(&json!({"user_feedback": ""})), "render");
        assert_eq!(should_refine(&json!({})), "render");
    }

    #[test]
    fn test_should_verify_gate() {
        let gated = should_verify(true);
        assert_eq!(gated(&json!({"verify_blocked": true})), "fail");
        assert_eq!(gated(&json!({"verify_blocked": false})), "pass");

        let ungated = should_verify(false);
        assert_eq!(ungated(&json!({"verify_blocked": true})), "pass");
    }
}
