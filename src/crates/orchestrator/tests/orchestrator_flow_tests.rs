//! End-to-end orchestrator flows: create -> waiting_input -> resume ->
//! completed, cancellation mid-run, and the event trail each leaves behind.

use async_trait::async_trait;
use futures::StreamExt;
use orchestrator::config::{CheckpointerMode, Settings};
use orchestrator::db::models::Session;
use orchestrator::db::repositories::SessionRepository;
use orchestrator::db::schema::create_schema;
use orchestrator::db::DatabasePool;
use orchestrator::events::{EventEmitter, EventStore};
use orchestrator::graph::nodes::{
    BriefOutput, GenerationAgents, NullAppDataStore, PassthroughAgents, VerifyReport,
};
use orchestrator::graph::{OrchestratorResponse, SiteOrchestrator, StreamRequest};
use orchestrator::graph::state::GraphState;
use orchestrator::services::page::{PageService, PageVersionService};
use orchestrator::services::run::RunService;
use orchestrator::Result;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

async fn pool() -> DatabasePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}

fn settings() -> Settings {
    Settings {
        checkpointer_mode: CheckpointerMode::Memory,
        ..Default::default()
    }
}

async fn orchestrator_with(
    pool: &DatabasePool,
    agents: Arc<dyn GenerationAgents>,
) -> (SiteOrchestrator, Arc<EventEmitter>) {
    SessionRepository::create(pool, &Session::new("s1".to_string(), "t".to_string()))
        .await
        .unwrap();
    let emitter = Arc::new(EventEmitter::new(EventStore::new(pool.clone()), "s1"));
    let orchestrator = SiteOrchestrator::new(
        pool.clone(),
        "s1",
        settings(),
        emitter.clone(),
        agents,
        Arc::new(orchestrator::graph::nodes::PassthroughRenderer),
        Arc::new(NullAppDataStore),
    )
    .await
    .unwrap();
    (orchestrator, emitter)
}

async fn drive(
    orchestrator: &SiteOrchestrator,
    request: StreamRequest,
) -> Vec<OrchestratorResponse> {
    orchestrator.stream_responses(request).collect().await
}

fn event_types(events: &[orchestrator::events::EventRecord]) -> Vec<String> {
    events.iter().map(|event| event.event_type.clone()).collect()
}

#[tokio::test]
async fn test_generate_now_runs_to_completion() {
    let pool = pool().await;
    let (orchestrator, emitter) =
        orchestrator_with(&pool, Arc::new(PassthroughAgents)).await;

    let responses = drive(
        &orchestrator,
        StreamRequest {
            user_message: "build a coffee landing page".to_string(),
            generate_now: true,
            target_pages: vec!["home".to_string(), "menu".to_string()],
            ..Default::default()
        },
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].action, "pages_generated");

    let runs = RunService::new(pool.clone()).list_runs("s1").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "completed");
    assert!(runs[0].started_at.is_some());
    assert!(runs[0].finished_at.is_some());

    let (events, _) = emitter.events_since(0);
    let types = event_types(&events);
    for expected in [
        "agent_start",
        "run_created",
        "run_started",
        "brief_start",
        "brief_complete",
        "generate_start",
        "generate_complete",
        "verify_start",
        "verify_pass",
        "run_completed",
        "done",
    ] {
        assert!(types.contains(&expected.to_string()), "missing {expected}: {types:?}");
    }

    // Pages rendered and versioned through the graph path.
    let pages = PageService::new(pool.clone()).list_pages("s1").await.unwrap();
    assert_eq!(pages.len(), 2);
    for page in &pages {
        let current = PageVersionService::new(pool.clone())
            .get_current(&page.id)
            .await
            .unwrap();
        assert!(current.is_some());
    }

    // Product doc persisted by the brief node.
    let doc = orchestrator::services::product_doc::ProductDocService::new(pool.clone())
        .get_by_session("s1")
        .await
        .unwrap();
    assert!(doc.is_some());
}

#[tokio::test]
async fn test_interrupt_then_resume_completes() {
    let pool = pool().await;
    let (orchestrator, emitter) =
        orchestrator_with(&pool, Arc::new(PassthroughAgents)).await;

    let responses = drive(
        &orchestrator,
        StreamRequest {
            user_message: "hello".to_string(),
            generate_now: false,
            ..Default::default()
        },
    )
    .await;
    assert_eq!(responses[0].action, "refine_waiting");

    let runs = RunService::new(pool.clone());
    let waiting = runs.get_latest_waiting_run("s1").await.unwrap().unwrap();
    assert_eq!(waiting.status, "waiting_input");

    let (events, index) = emitter.events_since(0);
    let types = event_types(&events);
    for expected in ["run_created", "run_started", "interrupt", "run_waiting_input"] {
        assert!(types.contains(&expected.to_string()), "missing {expected}: {types:?}");
    }

    // Resume with feedback; the run picks up at the gate and completes.
    let responses = drive(
        &orchestrator,
        StreamRequest {
            resume: Some(json!({"run_id": waiting.id, "user_feedback": "improve spacing"})),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(responses[0].action, "pages_generated");

    let resumed = runs.get_run(&waiting.id).await.unwrap();
    assert_eq!(resumed.status, "completed");

    let (events, _) = emitter.events_since(index);
    let types = event_types(&events);
    assert!(types.contains(&"run_resumed".to_string()));
    assert!(types.contains(&"refine_start".to_string()));
    assert!(types.contains(&"run_completed".to_string()));
}

#[tokio::test]
async fn test_resume_without_waiting_run_yields_error() {
    let pool = pool().await;
    let (orchestrator, _) = orchestrator_with(&pool, Arc::new(PassthroughAgents)).await;

    let responses = drive(
        &orchestrator,
        StreamRequest {
            resume: Some(json!({"user_feedback": "anything"})),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(responses[0].action, "error");
}

#[tokio::test]
async fn test_event_seq_is_gap_free_across_the_flow() {
    let pool = pool().await;
    let (orchestrator, _) = orchestrator_with(&pool, Arc::new(PassthroughAgents)).await;

    drive(
        &orchestrator,
        StreamRequest {
            user_message: "go".to_string(),
            generate_now: true,
            ..Default::default()
        },
    )
    .await;

    let (events, _) = EventStore::new(pool.clone())
        .get_events("s1", None, 5000)
        .await
        .unwrap();
    assert!(!events.is_empty());
    for (index, event) in events.iter().enumerate() {
        assert_eq!(event.seq, index as i64 + 1);
    }
}

/// Agents that cancel their own run while the brief is being authored, the
/// way an HTTP cancel lands mid-flight.
struct SelfCancellingAgents;

#[async_trait]
impl GenerationAgents for SelfCancellingAgents {
    async fn setup_tools(&self, _state: &GraphState) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn author_brief(&self, state: &GraphState) -> Result<BriefOutput> {
        if let Some(run_id) = &state.run_id {
            RunService::mark_cancelled(run_id);
        }
        Ok(BriefOutput {
            product_doc: json!({"product_type": "landing", "content": "# x"}),
            pages: vec![json!({"slug": "home", "title": "home"})],
            data_model: None,
        })
    }

    async fn extract_style(&self, _state: &GraphState) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn build_registry(&self, _state: &GraphState) -> Result<Value> {
        Ok(json!({"components": []}))
    }

    async fn generate_schemas(&self, _state: &GraphState) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn score_aesthetics(&self, _state: &GraphState) -> Result<Value> {
        Ok(json!({}))
    }

    async fn refine_schemas(&self, _state: &GraphState, _feedback: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn verify(&self, _state: &GraphState) -> Result<VerifyReport> {
        Ok(VerifyReport {
            overall_passed: true,
            checks: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_cancellation_observed_at_node_boundary() {
    let pool = pool().await;
    let (orchestrator, emitter) =
        orchestrator_with(&pool, Arc::new(SelfCancellingAgents)).await;

    let responses = drive(
        &orchestrator,
        StreamRequest {
            user_message: "go".to_string(),
            generate_now: true,
            ..Default::default()
        },
    )
    .await;
    assert_eq!(responses[0].action, "error");
    assert!(responses[0].message.contains("cancelled"));

    let runs = RunService::new(pool.clone()).list_runs("s1").await.unwrap();
    assert_eq!(runs[0].status, "cancelled");
    assert!(runs[0].finished_at.is_some());

    let (events, _) = emitter.events_since(0);
    let types = event_types(&events);
    assert!(types.contains(&"run_cancelled".to_string()));
    assert!(!types.contains(&"run_completed".to_string()));
}
