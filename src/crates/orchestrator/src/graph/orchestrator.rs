//! The orchestrator façade: one call per user request
//!
//! `stream_responses` opens (or resumes) a run, drives the generation graph
//! with streamed updates, persists outcomes through the run and state stores,
//! and emits run lifecycle events throughout. It yields a finite sequence of
//! high-level response records; fine-grained progress flows through the
//! emitter and the event log.

use crate::config::Settings;
use crate::db::models::{BuildStatus, Run, RunStatus};
use crate::db::DatabasePool;
use crate::events::{EventEmitter, EventType};
use crate::graph::build::create_generation_graph;
use crate::graph::checkpointer::build_checkpointer;
use crate::graph::nodes::{NodeContext, NEED_USER_FEEDBACK};
use crate::graph::state::GraphState;
use crate::policy::ToolPolicyService;
use crate::services::run::{CreateRunParams, RunService, RunUpdate};
use crate::services::state_store::{MetadataUpdate, StateStoreService};
use crate::{new_trace_id, OrchestratorError, Result};
use flowgraph_checkpoint::CheckpointConfig;
use flowgraph_core::{CompiledGraph, GraphInput, Interrupt, StreamUpdate};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;

/// A user request handed to the orchestrator
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub user_message: String,
    pub history: Vec<Value>,
    pub generate_now: bool,
    pub style_reference: Option<Value>,
    pub target_pages: Vec<String>,
    /// Resume payload; presence selects the resume path
    pub resume: Option<Value>,
}

/// One high-level response record
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestratorResponse {
    pub session_id: String,
    pub phase: String,
    pub message: String,
    pub is_complete: bool,
    /// error | refine_waiting | pages_generated | direct_reply
    pub action: String,
    pub affected_pages: Vec<String>,
}

impl OrchestratorResponse {
    fn new(session_id: &str, message: impl Into<String>, action: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: "flowgraph".to_string(),
            message: message.into(),
            is_complete: true,
            action: action.to_string(),
            affected_pages: Vec::new(),
        }
    }
}

/// Drives the generation graph for one session
pub struct SiteOrchestrator {
    pool: DatabasePool,
    session_id: String,
    settings: Settings,
    emitter: Arc<EventEmitter>,
    graph: CompiledGraph,
}

impl SiteOrchestrator {
    /// Build the orchestrator: checkpointer from configuration, graph wired
    /// over the given collaborators
    pub async fn new(
        pool: DatabasePool,
        session_id: impl Into<String>,
        settings: Settings,
        emitter: Arc<EventEmitter>,
        agents: Arc<dyn crate::graph::nodes::GenerationAgents>,
        renderer: Arc<dyn crate::graph::nodes::PageRenderer>,
        app_data: Arc<dyn crate::graph::nodes::AppDataStore>,
    ) -> Result<Self> {
        let checkpointer = build_checkpointer(&settings).await?;
        let project_root = std::env::current_dir().unwrap_or_else(|_| ".".into());
        let policy = Arc::new(ToolPolicyService::new(&settings, project_root));
        let ctx = Arc::new(NodeContext {
            pool: pool.clone(),
            settings: settings.clone(),
            emitter: emitter.clone(),
            agents,
            renderer,
            app_data,
            policy,
        });
        let graph = create_generation_graph(ctx, checkpointer)?;
        Ok(Self {
            pool,
            session_id: session_id.into(),
            settings,
            emitter,
            graph,
        })
    }

    fn runs(&self) -> RunService {
        RunService::new(self.pool.clone())
    }

    fn state_store(&self) -> StateStoreService {
        StateStoreService::new(self.pool.clone())
    }

    async fn emit_run_event(&self, event_type: EventType, run: &Run, extra: Value) {
        let mut payload = json!({
            "run_id": run.id,
            "checkpoint_thread": run.checkpoint_thread,
        });
        if let (Some(map), Some(extra_map)) = (payload.as_object_mut(), extra.as_object()) {
            for (key, value) in extra_map {
                map.insert(key.clone(), value.clone());
            }
        }
        self.emitter.emit(event_type, payload).await;
    }

    async fn emit_agent_end(&self, status: &str, summary: &str) {
        self.emitter
            .emit(
                EventType::AgentEnd,
                json!({
                    "agent_id": "flowgraph",
                    "agent_type": "FlowGraph",
                    "status": status,
                    "summary": summary,
                }),
            )
            .await;
    }

    /// The initial graph state for a fresh run
    fn build_initial_state(&self, request: &StreamRequest, run: &Run) -> Value {
        let assets = request
            .style_reference
            .as_ref()
            .and_then(|reference| reference.get("images"))
            .and_then(|images| images.as_array())
            .cloned()
            .unwrap_or_default();
        let state = GraphState {
            session_id: self.session_id.clone(),
            user_input: request.user_message.clone(),
            assets,
            generate_now: request.generate_now,
            target_pages: request.target_pages.clone(),
            aesthetic_enabled: self.settings.aesthetic_scoring_enabled,
            build_status: "pending".to_string(),
            run_id: Some(run.id.clone()),
            run_status: "running".to_string(),
            ..Default::default()
        };
        serde_json::to_value(state).unwrap_or_else(|_| json!({}))
    }

    async fn check_cancelled(&self, run_id: &str) -> bool {
        if RunService::is_cancelled(run_id) {
            return true;
        }
        match self.runs().get_run(run_id).await {
            Ok(run) if run.run_status() == RunStatus::Cancelled => {
                RunService::mark_cancelled(run_id);
                true
            }
            _ => false,
        }
    }

    fn merge_update(latest: &mut Value, update: &Value) {
        if let (Some(base), Some(patch)) = (latest.as_object_mut(), update.as_object()) {
            for (key, value) in patch {
                if key.starts_with("__") {
                    continue;
                }
                base.insert(key.clone(), value.clone());
            }
        }
    }

    async fn resolve_state(&self, config: &CheckpointConfig, fallback: &Value) -> Value {
        match self.graph.get_state(config).await {
            Ok(Some(state)) => state,
            _ => fallback.clone(),
        }
    }

    async fn persist_run_state(&self, resolved_state: &Value) {
        let state = GraphState::from_value(resolved_state);
        let update = MetadataUpdate {
            graph_state: Some(resolved_state.clone()),
            build_status: BuildStatus::parse(&state.build_status),
            build_artifacts: state.build_artifacts.clone(),
            aesthetic_scores: state.aesthetic_scores.clone(),
        };
        if let Err(error) = self.state_store().update_metadata(&self.session_id, update).await {
            tracing::error!(session_id = %self.session_id, %error, "failed to persist graph state");
        }
    }

    /// Handle one user request, yielding high-level responses
    pub fn stream_responses(
        &self,
        request: StreamRequest,
    ) -> impl Stream<Item = OrchestratorResponse> + '_ {
        async_stream::stream! {
            self.emitter
                .emit(
                    EventType::AgentStart,
                    json!({"agent_id": "flowgraph", "agent_type": "FlowGraph"}),
                )
                .await;

            if !self.graph.has_checkpointer() {
                self.emitter
                    .emit(
                        EventType::Error,
                        json!({"message": "Checkpointer disabled; resume is unavailable."}),
                    )
                    .await;
            }

            let prepared: Result<(Run, GraphInput)> = async {
                if let Some(resume) = &request.resume {
                    let run_id = resume
                        .get("run_id")
                        .and_then(|value| value.as_str())
                        .map(|value| value.to_string());
                    let run = self
                        .runs()
                        .resolve_resume_run(&self.session_id, run_id.as_deref())
                        .await?;
                    let mut payload = resume.clone();
                    if let Some(map) = payload.as_object_mut() {
                        map.insert("run_id".to_string(), Value::String(run.id.clone()));
                    }
                    let run = self.runs().resume_run(&run.id, payload.clone()).await?;
                    self.emitter.set_run_id(Some(run.id.clone()));
                    self.emit_run_event(EventType::RunResumed, &run, json!({"status": "running"}))
                        .await;
                    Ok((run, GraphInput::Resume(payload)))
                } else {
                    let run = self
                        .runs()
                        .create_run(
                            &self.session_id,
                            CreateRunParams {
                                message: request.user_message.clone(),
                                generate_now: request.generate_now,
                                style_reference: request.style_reference.clone(),
                                target_pages: request.target_pages.clone(),
                                ..Default::default()
                            },
                        )
                        .await?;
                    self.emitter.set_run_id(Some(run.id.clone()));
                    self.emit_run_event(EventType::RunCreated, &run, json!({"status": "queued"}))
                        .await;
                    let run = self.runs().start_run(&run.id).await?;
                    self.emit_run_event(EventType::RunStarted, &run, json!({"status": "running"}))
                        .await;
                    let initial = self.build_initial_state(&request, &run);
                    Ok((run, GraphInput::Start(initial)))
                }
            }
            .await;

            let (run, graph_input) = match prepared {
                Ok(prepared) => prepared,
                Err(error) => {
                    let message = error.to_string();
                    self.emitter
                        .emit(EventType::Error, json!({"message": message}))
                        .await;
                    self.emit_agent_end("failed", &message).await;
                    yield OrchestratorResponse::new(&self.session_id, message, "error");
                    return;
                }
            };

            let config = CheckpointConfig::new().with_thread_id(run.checkpoint_thread.clone());

            let mut latest_state = match &graph_input {
                GraphInput::Start(initial) => initial.clone(),
                GraphInput::Resume(_) => self
                    .resolve_state(&config, &json!({"run_id": run.id}))
                    .await,
            };
            let mut interrupt_payload: Option<Value> = None;
            let mut failure: Option<OrchestratorError> = None;
            let mut cancelled = false;

            {
                let mut updates = self.graph.stream(graph_input, config.clone());
                while let Some(update) = updates.next().await {
                    match update {
                        Ok(StreamUpdate::Node { update, .. }) => {
                            Self::merge_update(&mut latest_state, &update);
                        }
                        Ok(StreamUpdate::Interrupt { payload, .. }) => {
                            self.emitter.emit(EventType::Interrupt, payload.clone()).await;
                            let needs_feedback = Interrupt::try_from(&payload)
                                .map(|interrupt| interrupt.is(NEED_USER_FEEDBACK))
                                .unwrap_or(false);
                            if needs_feedback {
                                self.emitter
                                    .emit(EventType::RefineWaiting, payload.clone())
                                    .await;
                            }
                            interrupt_payload = Some(payload);
                            break;
                        }
                        Err(flowgraph_core::GraphError::Cancelled(_)) => {
                            cancelled = true;
                            break;
                        }
                        Err(error) => {
                            failure = Some(error.into());
                            break;
                        }
                    }
                    if self.check_cancelled(&run.id).await {
                        cancelled = true;
                        break;
                    }
                }
            }

            if cancelled {
                let mut resolved = self.resolve_state(&config, &latest_state).await;
                if let Some(map) = resolved.as_object_mut() {
                    map.insert("run_id".to_string(), Value::String(run.id.clone()));
                    map.insert("run_status".to_string(), Value::String("cancelled".to_string()));
                }
                if let Err(error) = self
                    .runs()
                    .persist_run_state(&run.id, RunStatus::Cancelled, RunUpdate::default())
                    .await
                {
                    tracing::warn!(run_id = %run.id, %error, "failed to persist cancelled run");
                }
                self.emit_run_event(EventType::RunCancelled, &run, json!({"status": "cancelled"}))
                    .await;
                self.persist_run_state(&resolved).await;
                self.emit_agent_end("failed", "Run cancelled").await;
                yield OrchestratorResponse::new(&self.session_id, "Run cancelled.", "error");
                return;
            }

            if let Some(error) = failure {
                let trace_id = new_trace_id();
                let message = format!("Graph execution failed: {error}");
                if let Err(persist_error) = self
                    .runs()
                    .persist_run_state(
                        &run.id,
                        RunStatus::Failed,
                        RunUpdate {
                            latest_error: Some(json!({"message": message, "trace_id": trace_id})),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    tracing::error!(run_id = %run.id, %persist_error, "failed to persist failed run");
                }
                self.emit_run_event(
                    EventType::RunFailed,
                    &run,
                    json!({"status": "failed", "error": message, "trace_id": trace_id}),
                )
                .await;
                self.emitter
                    .emit(EventType::Error, json!({"message": message, "trace_id": trace_id}))
                    .await;
                self.emit_agent_end("failed", &message).await;
                yield OrchestratorResponse::new(&self.session_id, message, "error");
                return;
            }

            let mut resolved = self.resolve_state(&config, &latest_state).await;
            if let Some(map) = resolved.as_object_mut() {
                map.insert("run_id".to_string(), Value::String(run.id.clone()));
            }

            if let Some(payload) = interrupt_payload {
                if let Err(error) = self
                    .runs()
                    .persist_run_state(&run.id, RunStatus::WaitingInput, RunUpdate::default())
                    .await
                {
                    tracing::error!(run_id = %run.id, %error, "failed to persist waiting run");
                }
                self.emit_run_event(
                    EventType::RunWaitingInput,
                    &run,
                    json!({"status": "waiting_input"}),
                )
                .await;
                if let Some(map) = resolved.as_object_mut() {
                    map.insert(
                        "run_status".to_string(),
                        Value::String("waiting_input".to_string()),
                    );
                }
                self.persist_run_state(&resolved).await;

                let message = Interrupt::try_from(&payload)
                    .map(|interrupt| interrupt.message_or("Waiting for feedback.").to_string())
                    .unwrap_or_else(|_| "Waiting for feedback.".to_string());
                self.emit_agent_end("success", "Graph interrupted").await;
                self.emitter
                    .emit(EventType::Done, json!({"summary": "Waiting for feedback"}))
                    .await;
                let mut response =
                    OrchestratorResponse::new(&self.session_id, message, "refine_waiting");
                response.affected_pages = request.target_pages.clone();
                yield response;
                return;
            }

            if let Err(error) = self
                .runs()
                .persist_run_state(&run.id, RunStatus::Completed, RunUpdate::default())
                .await
            {
                tracing::error!(run_id = %run.id, %error, "failed to persist completed run");
            }
            let mut completed_payload = json!({"status": "completed"});
            if let Some(migration) = resolved.get("data_model_migration") {
                if migration.is_object() {
                    completed_payload["data_model_migration"] = migration.clone();
                }
            }
            self.emit_run_event(EventType::RunCompleted, &run, completed_payload).await;

            if let Some(map) = resolved.as_object_mut() {
                map.insert("run_status".to_string(), Value::String("completed".to_string()));
            }
            self.persist_run_state(&resolved).await;

            let final_state = GraphState::from_value(&resolved);
            let action = if final_state.build_status == "success"
                && !final_state.page_schemas.is_empty()
            {
                "pages_generated"
            } else {
                "direct_reply"
            };

            self.emit_agent_end("success", "Graph run completed").await;
            self.emitter
                .emit(EventType::Done, json!({"summary": "Graph run completed"}))
                .await;

            let mut response =
                OrchestratorResponse::new(&self.session_id, "Workflow completed.", action);
            response.affected_pages = request.target_pages.clone();
            yield response;
        }
    }
}
