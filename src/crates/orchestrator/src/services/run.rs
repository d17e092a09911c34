//! Run lifecycle service
//!
//! Owns the run status machine and its side effects: `started_at` on the
//! first entry to `running`, `finished_at` on the first terminal entry, and
//! the process-wide cancelled-run set that in-flight graph steps poll at node
//! boundaries. Any transition outside the matrix is a state conflict.

use crate::db::models::{now_rfc3339, Run, RunStatus};
use crate::db::repositories::RunRepository;
use crate::db::DatabasePool;
use crate::{OrchestratorError, Result};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

static CANCELLED_RUNS: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn cancelled_runs() -> &'static Mutex<HashSet<String>> {
    CANCELLED_RUNS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Parameters for opening a new run
#[derive(Debug, Clone, Default)]
pub struct CreateRunParams {
    pub message: String,
    pub generate_now: bool,
    pub style_reference: Option<serde_json::Value>,
    pub target_pages: Vec<String>,
    pub trigger_source: Option<String>,
    pub parent_run_id: Option<String>,
    pub checkpoint_thread: Option<String>,
    pub checkpoint_ns: Option<String>,
}

/// Fields that may accompany a status transition
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub resume_payload: Option<serde_json::Value>,
    pub latest_error: Option<serde_json::Value>,
    pub metrics: Option<serde_json::Value>,
}

/// Service for run rows and the cancellation registry
#[derive(Clone)]
pub struct RunService {
    pool: DatabasePool,
}

impl RunService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Open a run in `queued` for the given session
    pub async fn create_run(&self, session_id: &str, params: CreateRunParams) -> Result<Run> {
        let session_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        if session_exists.is_none() {
            return Err(OrchestratorError::NotFound("Session not found".to_string()));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let checkpoint_thread = params
            .checkpoint_thread
            .unwrap_or_else(|| format!("{session_id}:{run_id}"));

        let mut request_context = serde_json::json!({
            "generate_now": params.generate_now,
            "target_pages": params.target_pages,
        });
        if let Some(style_reference) = params.style_reference {
            request_context["style_reference"] = style_reference;
        }

        let now = now_rfc3339();
        let run = Run {
            id: run_id,
            session_id: session_id.to_string(),
            parent_run_id: params.parent_run_id,
            trigger_source: params.trigger_source.unwrap_or_else(|| "chat".to_string()),
            status: RunStatus::Queued.as_str().to_string(),
            input_message: params.message,
            resume_payload: None,
            checkpoint_thread,
            checkpoint_ns: params.checkpoint_ns,
            latest_error: None,
            metrics: Some(request_context.to_string()),
            started_at: None,
            finished_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        Ok(RunRepository::create(&self.pool, &run).await?)
    }

    /// Get a run or fail with `NotFound`
    pub async fn get_run(&self, run_id: &str) -> Result<Run> {
        RunRepository::get_by_id(&self.pool, run_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Run not found".to_string()))
    }

    /// List runs of a session, newest first
    pub async fn list_runs(&self, session_id: &str) -> Result<Vec<Run>> {
        Ok(RunRepository::list_by_session(&self.pool, session_id).await?)
    }

    /// The most recently updated `waiting_input` run of a session
    pub async fn get_latest_waiting_run(&self, session_id: &str) -> Result<Option<Run>> {
        Ok(RunRepository::latest_waiting(&self.pool, session_id).await?)
    }

    /// Resolve the run a resume request targets
    ///
    /// An explicit `run_id` must belong to the session; otherwise the latest
    /// `waiting_input` run is used. No candidate is a state conflict.
    pub async fn resolve_resume_run(
        &self,
        session_id: &str,
        run_id: Option<&str>,
    ) -> Result<Run> {
        if let Some(run_id) = run_id {
            let run = self.get_run(run_id).await?;
            if run.session_id != session_id {
                return Err(OrchestratorError::StateConflict(format!(
                    "Run {run_id} does not belong to session {session_id}"
                )));
            }
            return Ok(run);
        }
        self.get_latest_waiting_run(session_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::StateConflict(format!(
                    "No waiting_input run found for session {session_id}"
                ))
            })
    }

    /// Transition a queued run into `running`
    pub async fn start_run(&self, run_id: &str) -> Result<Run> {
        self.persist_run_state(run_id, RunStatus::Running, RunUpdate::default())
            .await
    }

    /// Resume a `waiting_input` run with the caller-supplied payload
    pub async fn resume_run(&self, run_id: &str, resume_payload: serde_json::Value) -> Result<Run> {
        let run = self.get_run(run_id).await?;
        if run.run_status() != RunStatus::WaitingInput {
            return Err(OrchestratorError::StateConflict(format!(
                "Run {run_id} is in state '{}', expected 'waiting_input'",
                run.status
            )));
        }
        self.persist_run_state(
            run_id,
            RunStatus::Running,
            RunUpdate {
                resume_payload: Some(resume_payload),
                ..Default::default()
            },
        )
        .await
    }

    /// Cancel a run
    ///
    /// Returns the run and whether a transition happened; cancelling a
    /// terminal run is a no-op.
    pub async fn cancel_run(&self, run_id: &str) -> Result<(Run, bool)> {
        let run = self.get_run(run_id).await?;
        if run.is_terminal() {
            if run.run_status() == RunStatus::Cancelled {
                Self::mark_cancelled(run_id);
            }
            return Ok((run, false));
        }
        let updated = self
            .persist_run_state(run_id, RunStatus::Cancelled, RunUpdate::default())
            .await?;
        Ok((updated, true))
    }

    /// Validate and persist a status transition with its side effects
    pub async fn persist_run_state(
        &self,
        run_id: &str,
        next_status: RunStatus,
        update: RunUpdate,
    ) -> Result<Run> {
        let mut run = self.get_run(run_id).await?;
        let current = run.run_status();

        if next_status != current {
            if !current.can_transition_to(next_status) {
                return Err(OrchestratorError::StateConflict(format!(
                    "Invalid transition {current} -> {next_status}"
                )));
            }
            run.status = next_status.as_str().to_string();
        }

        if next_status == RunStatus::Running && run.started_at.is_none() {
            run.started_at = Some(now_rfc3339());
        }
        if next_status.is_terminal() && run.finished_at.is_none() {
            run.finished_at = Some(now_rfc3339());
        }

        match next_status {
            RunStatus::Cancelled => Self::mark_cancelled(run_id),
            RunStatus::Running => Self::clear_cancelled_marker(run_id),
            status if status.is_terminal() => Self::clear_cancelled_marker(run_id),
            _ => {}
        }

        if let Some(payload) = update.resume_payload {
            run.resume_payload = Some(payload.to_string());
        }
        if let Some(error) = update.latest_error {
            run.latest_error = Some(error.to_string());
        }
        if let Some(metrics) = update.metrics {
            run.metrics = Some(metrics.to_string());
        }

        Ok(RunRepository::update(&self.pool, &run).await?)
    }

    /// Fail runs stuck in `running` whose last update predates the window
    ///
    /// Invoked at startup: after a restart no coroutine can finish them, so
    /// callers must treat them as dead. `waiting_input` runs are untouched -
    /// they are externally resumable.
    pub async fn sweep_stale_running(&self, staleness_minutes: i64) -> Result<Vec<String>> {
        let cutoff = (Utc::now() - Duration::minutes(staleness_minutes)).to_rfc3339();
        let stale = RunRepository::stale_running(&self.pool, &cutoff).await?;

        let mut swept = Vec::new();
        for run in stale {
            let error = serde_json::json!({
                "message": "stale run recovered at startup",
                "trace_id": crate::new_trace_id(),
            });
            self.persist_run_state(
                &run.id,
                RunStatus::Failed,
                RunUpdate {
                    latest_error: Some(error),
                    ..Default::default()
                },
            )
            .await?;
            tracing::warn!(run_id = %run.id, "stale running run marked failed");
            swept.push(run.id);
        }
        Ok(swept)
    }

    /// Add a run to the process-wide cancelled set
    pub fn mark_cancelled(run_id: &str) {
        if run_id.is_empty() {
            return;
        }
        cancelled_runs().lock().insert(run_id.to_string());
    }

    /// Remove a run from the cancelled set
    pub fn clear_cancelled_marker(run_id: &str) {
        if run_id.is_empty() {
            return;
        }
        cancelled_runs().lock().remove(run_id);
    }

    /// Whether a run has been cancelled; polled at every node boundary
    pub fn is_cancelled(run_id: &str) -> bool {
        if run_id.is_empty() {
            return false;
        }
        cancelled_runs().lock().contains(run_id)
    }
}
