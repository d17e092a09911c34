//! Node bodies of the generation graph
//!
//! Each body coordinates one step: it reads the typed [`GraphState`], calls
//! the collaborator that owns the actual authoring work, persists what the
//! contract requires (product doc, page versions), and returns a partial
//! state update. Human-in-the-loop steps return an interrupt outcome instead.
//!
//! The collaborators - model-backed agents, the HTML renderer, the app-data
//! store - are trait objects on [`NodeContext`]; this crate ships only
//! [`PassthroughAgents`] and friends, deterministic implementations for
//! development and tests.

use crate::config::Settings;
use crate::db::models::{ProductDocStatus, VersionSource};
use crate::db::DatabasePool;
use crate::events::EventEmitter;
use crate::graph::state::GraphState;
use crate::policy::{PolicyAction, ToolPolicyContext, ToolPolicyService};
use crate::services::page::{NewPage, PageService, PageVersionService};
use crate::services::product_doc::ProductDocService;
use crate::{OrchestratorError, Result};
use async_trait::async_trait;
use flowgraph_core::{Interrupt, NodeOutcome, RESUME_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Interrupt kind raised when a run parks for user feedback
pub const NEED_USER_FEEDBACK: &str = "need_user_feedback";

/// Brief authoring output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefOutput {
    pub product_doc: Value,
    pub pages: Vec<Value>,
    pub data_model: Option<Value>,
}

/// Verification result for the generated pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub overall_passed: bool,
    pub checks: Vec<Value>,
}

/// One rendered page handed back by the renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedPage {
    pub slug: String,
    pub title: String,
    pub html: String,
}

/// Renderer output: artifact summary plus per-page HTML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOutput {
    pub build_artifacts: Value,
    pub pages: Vec<RenderedPage>,
}

/// Model-backed collaborators behind the graph nodes
#[async_trait]
pub trait GenerationAgents: Send + Sync {
    /// Prepare tool handles for the run (ephemeral, never persisted)
    async fn setup_tools(&self, state: &GraphState) -> Result<Vec<Value>>;

    /// Author the product doc, page list, and optional data model
    async fn author_brief(&self, state: &GraphState) -> Result<BriefOutput>;

    /// Extract style tokens from reference assets; `None` when nothing to do
    async fn extract_style(&self, state: &GraphState) -> Result<Option<Value>>;

    /// Assemble the component registry for the product
    async fn build_registry(&self, state: &GraphState) -> Result<Value>;

    /// Produce one schema per page
    async fn generate_schemas(&self, state: &GraphState) -> Result<Vec<Value>>;

    /// Score the generated pages aesthetically
    async fn score_aesthetics(&self, state: &GraphState) -> Result<Value>;

    /// Rework the page schemas according to user feedback
    async fn refine_schemas(&self, state: &GraphState, feedback: &str) -> Result<Vec<Value>>;

    /// Verify the generated pages
    async fn verify(&self, state: &GraphState) -> Result<VerifyReport>;
}

/// HTML rendering collaborator (file-tree output lives outside the core)
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, state: &GraphState) -> Result<RenderOutput>;
}

/// Application-data store collaborator materializing per-session schemas
#[async_trait]
pub trait AppDataStore: Send + Sync {
    async fn create_schema(&self, session_id: &str) -> Result<()>;
    async fn create_tables(&self, session_id: &str, data_model: &Value) -> Result<Vec<String>>;
    async fn insert(&self, session_id: &str, table: &str, rows: &[Value]) -> Result<u64>;
    async fn query(&self, session_id: &str, table: &str, filter: &Value) -> Result<Vec<Value>>;
    async fn drop_schema(&self, session_id: &str) -> Result<()>;
}

/// Everything a node body needs
pub struct NodeContext {
    pub pool: DatabasePool,
    pub settings: Settings,
    pub emitter: Arc<EventEmitter>,
    pub agents: Arc<dyn GenerationAgents>,
    pub renderer: Arc<dyn PageRenderer>,
    pub app_data: Arc<dyn AppDataStore>,
    pub policy: Arc<ToolPolicyService>,
}

fn update_map(entries: Vec<(&str, Value)>) -> NodeOutcome {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key.to_string(), value);
    }
    NodeOutcome::Update(map)
}

/// mcp_setup: prepare tool handles, dropping any the policy engine blocks
pub async fn mcp_setup_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let tools = ctx.agents.setup_tools(&state).await?;

    let mut admitted = Vec::with_capacity(tools.len());
    for tool in tools {
        let tool_name = tool
            .get("name")
            .and_then(|value| value.as_str())
            .unwrap_or("")
            .to_string();
        let policy_context = ToolPolicyContext {
            tool_name: tool_name.clone(),
            arguments: tool.get("arguments").cloned().unwrap_or(Value::Null),
            session_id: Some(state.session_id.clone()),
            run_id: state.run_id.clone(),
        };
        let findings = ctx.policy.pre_tool_use(&policy_context);
        if findings
            .iter()
            .any(|finding| finding.action == PolicyAction::Block)
        {
            tracing::warn!(tool = %tool_name, ?findings, "tool blocked by policy");
            continue;
        }
        admitted.push(tool);
    }
    Ok(update_map(vec![("mcp_tools", Value::Array(admitted))]))
}

/// brief: author the product doc and persist it as the session's doc
pub async fn brief_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let brief = ctx.agents.author_brief(&state).await?;

    let doc_service = ProductDocService::new(ctx.pool.clone()).with_emitter(ctx.emitter.clone());
    match doc_service.get_by_session(&state.session_id).await? {
        Some(existing) => {
            doc_service
                .update(
                    &existing.id,
                    None,
                    Some(brief.product_doc.clone()),
                    Some("brief regenerated"),
                    None,
                )
                .await?;
        }
        None => {
            doc_service
                .create(
                    &state.session_id,
                    brief
                        .product_doc
                        .get("content")
                        .and_then(|value| value.as_str())
                        .unwrap_or(""),
                    Some(brief.product_doc.clone()),
                    ProductDocStatus::Draft,
                )
                .await?;
        }
    }

    Ok(update_map(vec![
        ("product_doc", brief.product_doc),
        ("pages", Value::Array(brief.pages)),
        ("data_model", brief.data_model.unwrap_or(Value::Null)),
    ]))
}

/// style_extractor: derive style tokens; inactive when toggled off
pub async fn style_extractor_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    if !ctx.settings.style_extractor_enabled {
        return Ok(update_map(vec![]));
    }
    let state = GraphState::from_value(raw);
    let tokens = ctx.agents.extract_style(&state).await?;
    Ok(update_map(vec![(
        "style_tokens",
        tokens.unwrap_or(Value::Null),
    )]))
}

/// component_registry: assemble the registry
pub async fn component_registry_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let registry = ctx.agents.build_registry(&state).await?;
    Ok(update_map(vec![("component_registry", registry)]))
}

/// generate: produce one schema per page
pub async fn generate_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let schemas = ctx.agents.generate_schemas(&state).await?;
    Ok(update_map(vec![(
        "page_schemas",
        Value::Array(schemas),
    )]))
}

/// aesthetic_scorer: score the generated pages
pub async fn aesthetic_scorer_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let scores = ctx.agents.score_aesthetics(&state).await?;
    Ok(update_map(vec![("aesthetic_scores", scores)]))
}

/// refine_gate: absorb a resume payload, or park the run for feedback
///
/// With `generate_now` set the gate never parks; otherwise it interrupts
/// whenever no feedback is pending, which is also how a verify failure asks
/// the user for another round.
pub async fn refine_gate_node(_ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    if let Some(resume) = raw.get(RESUME_KEY) {
        let feedback = resume
            .get("user_feedback")
            .cloned()
            .or_else(|| resume.as_str().map(|text| Value::String(text.to_string())))
            .unwrap_or(Value::Null);
        return Ok(update_map(vec![("user_feedback", feedback)]));
    }

    let state = GraphState::from_value(raw);
    if state.user_feedback.is_none() && !state.generate_now {
        return Ok(NodeOutcome::Interrupt(
            Interrupt::new(NEED_USER_FEEDBACK)
                .with_message("Waiting for feedback before refinement.")
                .into_value(),
        ));
    }
    Ok(update_map(vec![]))
}

/// refine: apply the pending feedback and consume it
pub async fn refine_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let feedback = state.user_feedback.clone().unwrap_or_default();
    let schemas = ctx.agents.refine_schemas(&state, &feedback).await?;
    Ok(update_map(vec![
        ("page_schemas", Value::Array(schemas)),
        ("user_feedback", Value::Null),
    ]))
}

/// verify: run the verification checks and record the gate result
pub async fn verify_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let report = ctx.agents.verify(&state).await?;
    let blocked = !report.overall_passed;
    Ok(update_map(vec![
        ("verify_report", serde_json::to_value(&report)?),
        ("verify_blocked", Value::Bool(blocked)),
    ]))
}

/// render: produce the artifact, persist page versions, and materialize the
/// data model when one was authored
pub async fn render_node(ctx: &NodeContext, raw: &Value) -> Result<NodeOutcome> {
    let state = GraphState::from_value(raw);
    let output = ctx.renderer.render(&state).await?;

    let page_service = PageService::new(ctx.pool.clone()).with_emitter(ctx.emitter.clone());
    let version_service =
        PageVersionService::new(ctx.pool.clone()).with_emitter(ctx.emitter.clone());
    for rendered in &output.pages {
        let page = match crate::db::repositories::PageRepository::get_by_slug(
            &ctx.pool,
            &state.session_id,
            &rendered.slug,
        )
        .await?
        {
            Some(existing) => existing,
            None => {
                let order_index = page_service.list_pages(&state.session_id).await?.len() as i64;
                page_service
                    .create_page(
                        &state.session_id,
                        NewPage {
                            title: rendered.title.clone(),
                            slug: rendered.slug.clone(),
                            description: String::new(),
                            order_index,
                        },
                    )
                    .await?
            }
        };
        version_service
            .create_version(&page.id, &rendered.html, VersionSource::Auto, None)
            .await?;
    }

    let mut updates = vec![
        ("build_artifacts", output.build_artifacts),
        ("build_status", Value::String("success".to_string())),
    ];
    if let Some(data_model) = &state.data_model {
        if data_model.is_object() {
            ctx.app_data.create_schema(&state.session_id).await?;
            let tables = ctx
                .app_data
                .create_tables(&state.session_id, data_model)
                .await?;
            updates.push((
                "data_model_migration",
                json!({"schema": state.session_id, "tables": tables}),
            ));
        }
    }
    Ok(update_map(updates))
}

/// Deterministic agents for development and tests
///
/// Derives a landing-style product doc from the user input, one page per
/// requested target (or a single home page), and always-passing checks. Real
/// deployments plug model-backed implementations in instead.
#[derive(Debug, Clone, Default)]
pub struct PassthroughAgents;

#[async_trait]
impl GenerationAgents for PassthroughAgents {
    async fn setup_tools(&self, _state: &GraphState) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn author_brief(&self, state: &GraphState) -> Result<BriefOutput> {
        let slugs: Vec<String> = if state.target_pages.is_empty() {
            vec!["home".to_string()]
        } else {
            state.target_pages.clone()
        };
        let pages: Vec<Value> = slugs
            .iter()
            .map(|slug| json!({"slug": slug, "title": slug}))
            .collect();
        Ok(BriefOutput {
            product_doc: json!({
                "product_type": "landing",
                "title": state.user_input,
                "content": format!("# {}", state.user_input),
            }),
            pages,
            data_model: None,
        })
    }

    async fn extract_style(&self, _state: &GraphState) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn build_registry(&self, _state: &GraphState) -> Result<Value> {
        Ok(json!({"components": []}))
    }

    async fn generate_schemas(&self, state: &GraphState) -> Result<Vec<Value>> {
        Ok(state
            .pages
            .iter()
            .map(|page| json!({"page": page, "sections": []}))
            .collect())
    }

    async fn score_aesthetics(&self, _state: &GraphState) -> Result<Value> {
        Ok(json!({"overall": 7.0}))
    }

    async fn refine_schemas(&self, state: &GraphState, feedback: &str) -> Result<Vec<Value>> {
        Ok(state
            .page_schemas
            .iter()
            .map(|schema| {
                let mut updated = schema.clone();
                if let Some(map) = updated.as_object_mut() {
                    map.insert("feedback".to_string(), Value::String(feedback.to_string()));
                }
                updated
            })
            .collect())
    }

    async fn verify(&self, _state: &GraphState) -> Result<VerifyReport> {
        Ok(VerifyReport {
            overall_passed: true,
            checks: Vec::new(),
        })
    }
}

/// Renderer counterpart to [`PassthroughAgents`]
#[derive(Debug, Clone, Default)]
pub struct PassthroughRenderer;

#[async_trait]
impl PageRenderer for PassthroughRenderer {
    async fn render(&self, state: &GraphState) -> Result<RenderOutput> {
        let pages: Vec<RenderedPage> = state
            .page_schemas
            .iter()
            .filter_map(|schema| schema.get("page"))
            .filter_map(|page| {
                let slug = page.get("slug")?.as_str()?.to_string();
                let title = page
                    .get("title")
                    .and_then(|value| value.as_str())
                    .unwrap_or(&slug)
                    .to_string();
                Some(RenderedPage {
                    html: format!("<html><head><title>{title}</title></head><body></body></html>"),
                    slug,
                    title,
                })
            })
            .collect();
        Ok(RenderOutput {
            build_artifacts: json!({"pages": pages.len()}),
            pages,
        })
    }
}

/// App-data store that accepts everything and stores nothing
#[derive(Debug, Clone, Default)]
pub struct NullAppDataStore;

#[async_trait]
impl AppDataStore for NullAppDataStore {
    async fn create_schema(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn create_tables(&self, _session_id: &str, data_model: &Value) -> Result<Vec<String>> {
        Ok(data_model
            .get("tables")
            .and_then(|value| value.as_array())
            .map(|tables| {
                tables
                    .iter()
                    .filter_map(|table| table.get("name"))
                    .filter_map(|name| name.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, _session_id: &str, _table: &str, rows: &[Value]) -> Result<u64> {
        Ok(rows.len() as u64)
    }

    async fn query(&self, _session_id: &str, _table: &str, _filter: &Value) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn drop_schema(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Poll the cancellation registry for the run recorded in the state
pub fn ensure_not_cancelled(raw: &Value) -> Result<()> {
    if let Some(run_id) = raw.get("run_id").and_then(|value| value.as_str()) {
        if crate::services::run::RunService::is_cancelled(run_id) {
            return Err(OrchestratorError::Cancelled(format!("Run {run_id} cancelled")));
        }
    }
    Ok(())
}
