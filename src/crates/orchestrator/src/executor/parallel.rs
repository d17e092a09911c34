//! Parallel executor: bounded, abortable execution of a plan's task DAG
//!
//! One executor drives one plan. Each outer iteration reaps finished workers,
//! sweeps for stuck tasks, asks the scheduler for ready tasks up to the free
//! capacity, spawns them, and drains emitter events to the caller. A task
//! with `can_parallel = false` only starts when nothing else is running and
//! excludes concurrent starts until it completes. Temporary failures retry
//! with exponential backoff up to the policy budget; timeouts and exhausted
//! retries block dependents. Abort is cooperative through a watch channel.

use crate::db::models::{now_rfc3339, EventSource, Plan, PlanStatus, Task, TaskStatus};
use crate::db::repositories::{SnapshotRepository, TaskRepository};
use crate::db::DatabasePool;
use crate::events::{EventEmitter, EventRecord, EventType};
use crate::executor::retry::{is_temporary_error, TaskRetryPolicy};
use crate::executor::scheduler::TaskScheduler;
use crate::executor::task_executor::{ExecutionContext, TaskExecutorFactory};
use crate::new_trace_id;
use crate::services::plan::PlanService;
use crate::services::snapshot::SnapshotService;
use crate::services::task::{TaskService, TaskUpdate};
use crate::{OrchestratorError, Result};
use chrono::DateTime;
use futures::Stream;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const AVAILABLE_ACTIONS: &[&str] = &["retry", "skip", "modify", "abort"];

/// Executor tunables
#[derive(Debug, Clone)]
pub struct ParallelExecutorConfig {
    pub max_concurrent: usize,
    pub task_timeout: Duration,
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
    pub task_timeout_minutes: i64,
    pub retry: TaskRetryPolicy,
}

impl Default for ParallelExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            task_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(60),
            task_timeout_minutes: 30,
            retry: TaskRetryPolicy::default(),
        }
    }
}

impl ParallelExecutorConfig {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent_tasks,
            task_timeout: Duration::from_secs_f64(settings.task_timeout_seconds),
            cleanup_interval: Duration::from_secs_f64(settings.task_cleanup_interval_seconds),
            task_timeout_minutes: settings.task_timeout_minutes,
            ..Default::default()
        }
    }
}

/// Drives one plan's tasks to completion
pub struct ParallelExecutor {
    pool: DatabasePool,
    plan: Plan,
    emitter: Arc<EventEmitter>,
    context: Arc<ExecutionContext>,
    config: ParallelExecutorConfig,
    scheduler: Arc<Mutex<TaskScheduler>>,
    abort_tx: watch::Sender<bool>,
    abort_rx: watch::Receiver<bool>,
}

impl ParallelExecutor {
    /// Build the executor, constructing the scheduler from the plan's tasks
    pub async fn new(
        pool: DatabasePool,
        plan: Plan,
        emitter: Arc<EventEmitter>,
        context: Arc<ExecutionContext>,
        config: ParallelExecutorConfig,
    ) -> Result<Self> {
        let tasks = TaskRepository::list_by_plan(&pool, &plan.id).await?;
        let scheduler = Arc::new(Mutex::new(TaskScheduler::new(tasks)?));
        let (abort_tx, abort_rx) = watch::channel(false);
        Ok(Self {
            pool,
            plan,
            emitter,
            context,
            config,
            scheduler,
            abort_tx,
            abort_rx,
        })
    }

    /// Request a cooperative abort; in-flight tasks observe it at their next
    /// suspension point
    pub fn abort(&self) {
        let _ = self.abort_tx.send(true);
    }

    /// Run the plan, streaming emitter events to the caller
    pub fn execute(&self) -> impl Stream<Item = EventRecord> + '_ {
        async_stream::stream! {
            let mut event_index = 0usize;
            let mut running: HashMap<String, JoinHandle<()>> = HashMap::new();
            let mut running_serial: HashSet<String> = HashSet::new();
            let mut last_cleanup: Option<Instant> = None;

            loop {
                running.retain(|task_id, handle| {
                    let finished = handle.is_finished();
                    if finished {
                        running_serial.remove(task_id);
                    }
                    !finished
                });

                if *self.abort_rx.borrow() {
                    for (task_id, handle) in running.drain() {
                        handle.abort();
                        self.record_abort(&task_id).await;
                    }
                    break;
                }

                let sweep_due = last_cleanup
                    .map(|at| at.elapsed() >= self.config.cleanup_interval)
                    .unwrap_or(true);
                if sweep_due {
                    last_cleanup = Some(Instant::now());
                    self.sweep_timeouts().await;
                }

                let selected = self.select_ready_tasks(&running, &running_serial);
                for task in selected {
                    if !task.can_parallel {
                        running_serial.insert(task.id.clone());
                    }
                    self.scheduler.lock().set_status(&task.id, TaskStatus::InProgress);
                    let handle = tokio::spawn(run_task(TaskRun {
                        pool: self.pool.clone(),
                        emitter: self.emitter.clone(),
                        context: self.context.clone(),
                        scheduler: self.scheduler.clone(),
                        retry: self.config.retry.clone(),
                        task_timeout: self.config.task_timeout,
                        abort_rx: self.abort_rx.clone(),
                        task: task.clone(),
                    }));
                    running.insert(task.id, handle);
                }

                let (events, new_index) = self.emitter.events_since(event_index);
                event_index = new_index;
                for event in events {
                    yield event;
                }

                let settled = {
                    let scheduler = self.scheduler.lock();
                    scheduler.is_all_done()
                        || (running.is_empty() && scheduler.get_ready_tasks(1).is_empty())
                };
                if settled && running.is_empty() {
                    break;
                }

                tokio::time::sleep(self.config.poll_interval).await;
            }

            self.maybe_create_auto_snapshot().await;
            self.emitter
                .emit(
                    EventType::Done,
                    json!({"summary": format!("Plan {} execution completed", self.plan.id)}),
                )
                .await;

            let (events, _) = self.emitter.events_since(event_index);
            for event in events {
                yield event;
            }
        }
    }

    /// Ready tasks that fit the free capacity and the serial-exclusion rule
    fn select_ready_tasks(
        &self,
        running: &HashMap<String, JoinHandle<()>>,
        running_serial: &HashSet<String>,
    ) -> Vec<Task> {
        if !running_serial.is_empty() {
            return Vec::new();
        }
        let available = self.config.max_concurrent.saturating_sub(running.len());
        if available == 0 {
            return Vec::new();
        }

        let scheduler = self.scheduler.lock();
        let ready = scheduler.get_ready_tasks(available);

        let mut selected = Vec::new();
        for task in ready {
            if running.contains_key(&task.id) {
                continue;
            }
            if !task.can_parallel {
                if running.is_empty() && selected.is_empty() {
                    selected.push(task);
                }
                // A serial task runs alone either way.
                break;
            }
            selected.push(task);
            if selected.len() >= available {
                break;
            }
        }
        selected
    }

    async fn record_abort(&self, task_id: &str) {
        self.scheduler.lock().mark_aborted(task_id);
        let trace_id = new_trace_id();
        let message = format!("aborted (trace_id={trace_id})");
        if let Err(error) = TaskService::new(self.pool.clone())
            .set_status(
                task_id,
                TaskStatus::Aborted,
                TaskUpdate {
                    message: Some(message),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::error!(task_id, %error, "failed to mark task aborted");
        }
    }

    /// Sweep tasks whose `started_at` is older than the timeout window
    async fn sweep_timeouts(&self) {
        let task_service = TaskService::new(self.pool.clone());
        let timed_out = match task_service
            .cleanup_timeout_tasks(&self.plan.id, self.config.task_timeout_minutes)
            .await
        {
            Ok(timed_out) => timed_out,
            Err(error) => {
                tracing::error!(plan_id = %self.plan.id, %error, "timeout sweep failed");
                return;
            }
        };

        for item in timed_out {
            let blocked = self.scheduler.lock().mark_timeout(&item.task_id);
            self.emitter
                .emit_from(
                    EventType::TaskFailed,
                    json!({
                        "task_id": item.task_id,
                        "error_type": "timeout",
                        "error_message": item.message,
                        "retry_count": 0,
                        "max_retries": self.config.retry.max_retries,
                        "available_actions": AVAILABLE_ACTIONS,
                        "blocked_tasks": blocked,
                    }),
                    EventSource::Task,
                )
                .await;
            emit_blocked(&self.emitter, &item.task_id, &blocked, "dependency timed out").await;
        }
    }

    /// Create an auto snapshot once the plan is done, unless a newer auto
    /// snapshot already exists
    async fn maybe_create_auto_snapshot(&self) {
        let result: Result<()> = async {
            let plans = PlanService::new(self.pool.clone());
            let plan = plans.get_plan(&self.plan.id).await?;
            if plan.plan_status() != PlanStatus::Done {
                return Ok(());
            }
            let tasks = plans.list_tasks(&self.plan.id).await?;
            if tasks
                .iter()
                .any(|task| task.task_status() != TaskStatus::Done)
            {
                return Ok(());
            }

            if let Some(latest) =
                SnapshotRepository::latest_auto(&self.pool, &plan.session_id).await?
            {
                let latest_at = DateTime::parse_from_rfc3339(&latest.created_at).ok();
                let plan_at = DateTime::parse_from_rfc3339(&plan.updated_at).ok();
                if let (Some(latest_at), Some(plan_at)) = (latest_at, plan_at) {
                    if latest_at >= plan_at {
                        return Ok(());
                    }
                }
            }

            SnapshotService::new(self.pool.clone())
                .with_emitter(self.emitter.clone())
                .create_snapshot(
                    &plan.session_id,
                    crate::db::models::VersionSource::Auto,
                    None,
                )
                .await?;
            Ok(())
        }
        .await;

        if let Err(error) = result {
            tracing::error!(plan_id = %self.plan.id, %error, "failed to create auto snapshot");
        }
    }
}

struct TaskRun {
    pool: DatabasePool,
    emitter: Arc<EventEmitter>,
    context: Arc<ExecutionContext>,
    scheduler: Arc<Mutex<TaskScheduler>>,
    retry: TaskRetryPolicy,
    task_timeout: Duration,
    abort_rx: watch::Receiver<bool>,
    task: Task,
}

async fn run_task(mut run: TaskRun) {
    let task_service = TaskService::new(run.pool.clone());
    let task = run.task.clone();

    if let Err(error) = task_service
        .set_status(
            &task.id,
            TaskStatus::InProgress,
            TaskUpdate {
                progress: Some(0),
                ..Default::default()
            },
        )
        .await
    {
        tracing::error!(task_id = %task.id, %error, "failed to mark task in progress");
    }
    run.emitter
        .emit_from(
            EventType::TaskStarted,
            json!({"task_id": task.id, "task_title": task.title}),
            EventSource::Task,
        )
        .await;

    let executor = match TaskExecutorFactory::create(task.agent_type.as_deref()) {
        Ok(executor) => executor,
        Err(error) => {
            handle_failure(&run, &task_service, &error, "logic", 0).await;
            return;
        }
    };

    let mut retry_count = task.retry_count.max(0) as u32;
    loop {
        if *run.abort_rx.borrow() {
            handle_abort(&run, &task_service).await;
            return;
        }

        let outcome = tokio::select! {
            changed = run.abort_rx.changed() => {
                // A dropped sender means the executor is gone; treat it as
                // an abort rather than re-running the body unsupervised.
                if changed.is_err() || *run.abort_rx.borrow() {
                    handle_abort(&run, &task_service).await;
                    return;
                }
                continue;
            }
            outcome = tokio::time::timeout(
                run.task_timeout,
                executor.execute(&task, &run.emitter, &run.context),
            ) => outcome,
        };

        match outcome {
            Err(_elapsed) => {
                let message = format!(
                    "Task timed out after {}s",
                    run.task_timeout.as_secs()
                );
                handle_timeout(&run, &task_service, &message).await;
                return;
            }
            Ok(Ok(result)) => {
                if let Err(error) = task_service
                    .set_status(
                        &task.id,
                        TaskStatus::Done,
                        TaskUpdate {
                            progress: Some(100),
                            result: Some(result.clone()),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    tracing::error!(task_id = %task.id, %error, "failed to mark task done");
                }
                run.emitter
                    .emit_from(
                        EventType::TaskDone,
                        json!({"task_id": task.id, "result": result}),
                        EventSource::Task,
                    )
                    .await;
                run.scheduler.lock().mark_completed(&task.id);
                return;
            }
            Ok(Err(error)) if is_temporary_error(&error) => {
                retry_count += 1;
                if retry_count <= run.retry.max_retries {
                    let delay = run.retry.get_delay(retry_count);
                    if let Err(retry_error) = task_service
                        .retry_task(&task.id, run.retry.max_retries as i64)
                        .await
                    {
                        tracing::error!(task_id = %task.id, %retry_error, "failed to mark task retrying");
                    }
                    run.emitter
                        .emit_from(
                            EventType::TaskRetrying,
                            json!({
                                "task_id": task.id,
                                "attempt": retry_count,
                                "max_attempts": run.retry.max_retries,
                                "next_retry_in": delay.as_secs(),
                                "retry_count": retry_count,
                            }),
                            EventSource::Task,
                        )
                        .await;
                    tokio::time::sleep(delay).await;
                    continue;
                }
                handle_failure(&run, &task_service, &error, "temporary", retry_count).await;
                return;
            }
            Ok(Err(error)) => {
                handle_failure(&run, &task_service, &error, "logic", retry_count).await;
                return;
            }
        }
    }
}

async fn handle_abort(run: &TaskRun, task_service: &TaskService) {
    run.scheduler.lock().mark_aborted(&run.task.id);
    let trace_id = new_trace_id();
    if let Err(error) = task_service
        .set_status(
            &run.task.id,
            TaskStatus::Aborted,
            TaskUpdate {
                message: Some(format!("aborted (trace_id={trace_id})")),
                ..Default::default()
            },
        )
        .await
    {
        tracing::error!(task_id = %run.task.id, %error, "failed to mark task aborted");
    }
}

async fn handle_timeout(run: &TaskRun, task_service: &TaskService, message: &str) {
    let blocked = run.scheduler.lock().mark_timeout(&run.task.id);
    let trace_id = new_trace_id();
    let formatted = format!("{message} (trace_id={trace_id})");
    tracing::error!(task_id = %run.task.id, trace_id, "task timed out");

    if let Err(error) = task_service
        .set_status(
            &run.task.id,
            TaskStatus::Timeout,
            TaskUpdate {
                message: Some(formatted.clone()),
                ..Default::default()
            },
        )
        .await
    {
        tracing::error!(task_id = %run.task.id, %error, "failed to mark task timeout");
    }

    run.emitter
        .emit_from(
            EventType::TaskFailed,
            json!({
                "task_id": run.task.id,
                "error_type": "timeout",
                "error_message": formatted,
                "retry_count": run.task.retry_count,
                "max_retries": run.retry.max_retries,
                "available_actions": AVAILABLE_ACTIONS,
                "blocked_tasks": blocked,
                "trace_id": trace_id,
            }),
            EventSource::Task,
        )
        .await;
    emit_blocked(&run.emitter, &run.task.id, &blocked, "dependency timed out").await;
}

async fn handle_failure(
    run: &TaskRun,
    task_service: &TaskService,
    error: &OrchestratorError,
    error_type: &str,
    retry_count: u32,
) {
    let blocked = run.scheduler.lock().mark_failed(&run.task.id);
    let trace_id = new_trace_id();
    let formatted = format!("{error} (trace_id={trace_id})");
    tracing::error!(
        task_id = %run.task.id,
        error_type,
        trace_id,
        message = %formatted,
        "task failed"
    );

    if let Err(persist_error) = task_service
        .set_status(
            &run.task.id,
            TaskStatus::Failed,
            TaskUpdate {
                message: Some(formatted.clone()),
                ..Default::default()
            },
        )
        .await
    {
        tracing::error!(task_id = %run.task.id, %persist_error, "failed to mark task failed");
    }

    run.emitter
        .emit_from(
            EventType::TaskFailed,
            json!({
                "task_id": run.task.id,
                "error_type": error_type,
                "error_message": formatted,
                "retry_count": retry_count,
                "max_retries": run.retry.max_retries,
                "available_actions": AVAILABLE_ACTIONS,
                "blocked_tasks": blocked,
                "trace_id": trace_id,
            }),
            EventSource::Task,
        )
        .await;
    emit_blocked(&run.emitter, &run.task.id, &blocked, "dependency failed").await;
}

async fn emit_blocked(
    emitter: &EventEmitter,
    failed_task_id: &str,
    blocked: &[String],
    reason: &str,
) {
    for blocked_id in blocked {
        emitter
            .emit_from(
                EventType::TaskBlocked,
                json!({
                    "task_id": blocked_id,
                    "blocked_by": [failed_task_id],
                    "reason": reason,
                }),
                EventSource::Task,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::repositories::SessionRepository;
    use crate::db::schema::test_pool;
    use crate::events::EventStore;
    use crate::executor::task_executor::{AgentBackend, ChatTurn, GeneratedPage};
    use crate::services::plan::{NewTask, PlanService};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubBackend {
        generate_failures: AtomicU32,
    }

    impl StubBackend {
        fn new(generate_failures: u32) -> Self {
            Self {
                generate_failures: AtomicU32::new(generate_failures),
            }
        }
    }

    #[async_trait]
    impl AgentBackend for StubBackend {
        async fn interview(&self, _: &str, _: &[ChatTurn]) -> Result<serde_json::Value> {
            Ok(json!({"message": "ready", "is_complete": true}))
        }

        async fn generate_page(&self, requirements: &str) -> Result<GeneratedPage> {
            if self.generate_failures.load(Ordering::SeqCst) > 0 {
                self.generate_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(OrchestratorError::Temporary("rate limit".to_string()));
            }
            let slug = if requirements.contains("about") {
                "about"
            } else {
                "home"
            };
            Ok(GeneratedPage {
                slug: slug.to_string(),
                title: slug.to_string(),
                html: format!("<html>{slug}</html>"),
            })
        }

        async fn refine_page(&self, _: &str, current_html: &str) -> Result<String> {
            Ok(format!("{current_html}<!-- refined -->"))
        }

        async fn validate_html(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn export(&self, _: &str, _: &str) -> Result<serde_json::Value> {
            Ok(json!({"exported": true}))
        }
    }

    async fn fixture(
        backend: StubBackend,
        tasks: Vec<NewTask>,
    ) -> (ParallelExecutor, PlanService, String, DatabasePool) {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();
        crate::db::repositories::ProductDocRepository::create(
            &pool,
            &crate::db::models::ProductDoc {
                id: "d1".to_string(),
                session_id: "s1".to_string(),
                content: "# doc".to_string(),
                structured: "{}".to_string(),
                version: 1,
                status: "draft".to_string(),
                pending_regeneration_pages: "[]".to_string(),
                created_at: now_rfc3339(),
                updated_at: now_rfc3339(),
            },
        )
        .await
        .unwrap();

        let plans = PlanService::new(pool.clone());
        let plan = plans.create_plan("s1", "build site", tasks).await.unwrap();

        let emitter = Arc::new(EventEmitter::new(EventStore::new(pool.clone()), "s1"));
        let task_lookup = plans
            .list_tasks(&plan.id)
            .await
            .unwrap()
            .into_iter()
            .map(|task| (task.id.clone(), task))
            .collect();
        let context = Arc::new(ExecutionContext {
            pool: pool.clone(),
            session_id: "s1".to_string(),
            output_dir: "/tmp/out".to_string(),
            user_message: "build site".to_string(),
            plan_goal: "build site".to_string(),
            history: Vec::new(),
            agents: Arc::new(backend),
            task_lookup,
        });

        let config = ParallelExecutorConfig {
            poll_interval: Duration::from_millis(10),
            retry: TaskRetryPolicy {
                max_retries: 3,
                base_delay: 0.01,
                multiplier: 2.0,
            },
            ..Default::default()
        };
        let plan_id = plan.id.clone();
        let executor = ParallelExecutor::new(pool.clone(), plan, emitter, context, config)
            .await
            .unwrap();
        (executor, plans, plan_id, pool)
    }

    fn generation_task(title: &str, depends_on: Vec<&str>) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: Some(format!("generate the {title} page")),
            agent_type: Some("generation".to_string()),
            depends_on: depends_on.into_iter().map(String::from).collect(),
            can_parallel: true,
        }
    }

    #[tokio::test]
    async fn test_plan_runs_to_done() {
        let (executor, plans, plan_id, _pool) = fixture(
            StubBackend::new(0),
            vec![
                generation_task("home", vec![]),
                generation_task("about", vec!["0"]),
            ],
        )
        .await;

        let events: Vec<EventRecord> = executor.execute().collect().await;
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(types.contains(&"task_started"));
        assert!(types.contains(&"task_done"));
        assert_eq!(types.last(), Some(&"done"));

        let plan = plans.get_plan(&plan_id).await.unwrap();
        assert_eq!(plan.status, "done");
        for task in plans.list_tasks(&plan_id).await.unwrap() {
            assert_eq!(task.status, "done");
            assert_eq!(task.progress, 100);
        }
    }

    #[tokio::test]
    async fn test_temporary_failures_retry_then_succeed() {
        let (executor, plans, plan_id, _pool) =
            fixture(StubBackend::new(2), vec![generation_task("home", vec![])]).await;

        let events: Vec<EventRecord> = executor.execute().collect().await;
        let retries: Vec<&EventRecord> = events
            .iter()
            .filter(|event| event.event_type == "task_retrying")
            .collect();
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0].payload["attempt"], 1);
        assert_eq!(retries[1].payload["attempt"], 2);
        assert!(events.iter().any(|event| event.event_type == "task_done"));

        let plan = plans.get_plan(&plan_id).await.unwrap();
        assert_eq!(plan.status, "done");
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_and_block_dependents() {
        let (executor, plans, plan_id, _pool) = fixture(
            StubBackend::new(10),
            vec![
                generation_task("home", vec![]),
                generation_task("about", vec!["0"]),
            ],
        )
        .await;

        let events: Vec<EventRecord> = executor.execute().collect().await;
        let failed = events
            .iter()
            .find(|event| event.event_type == "task_failed")
            .unwrap();
        assert_eq!(failed.payload["error_type"], "temporary");
        assert!(failed.payload["error_message"]
            .as_str()
            .unwrap()
            .contains("trace_id="));
        assert_eq!(failed.payload["blocked_tasks"].as_array().unwrap().len(), 1);
        assert!(events.iter().any(|event| event.event_type == "task_blocked"));

        let tasks = plans.list_tasks(&plan_id).await.unwrap();
        assert_eq!(tasks[0].status, "failed");
        assert_eq!(tasks[1].status, "blocked");
    }

    #[tokio::test]
    async fn test_plan_completion_creates_auto_snapshot() {
        let (executor, _plans, _plan_id, pool) =
            fixture(StubBackend::new(0), vec![generation_task("home", vec![])]).await;

        let _events: Vec<EventRecord> = executor.execute().collect().await;

        let snapshots = SnapshotRepository::list_by_session(&pool, "s1", true)
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].source, "auto");
    }

    #[tokio::test]
    async fn test_serial_task_runs_alone() {
        let mut serial = generation_task("home", vec![]);
        serial.can_parallel = false;
        let (executor, plans, plan_id, _pool) = fixture(
            StubBackend::new(0),
            vec![serial, generation_task("about", vec![])],
        )
        .await;

        let _events: Vec<EventRecord> = executor.execute().collect().await;
        let plan = plans.get_plan(&plan_id).await.unwrap();
        assert_eq!(plan.status, "done");
    }
}
