//! Task service: status transitions with dependency side effects
//!
//! Setting a terminal failure status (failed, aborted, timeout) moves pending
//! dependents to `blocked`; a satisfying status (done, skipped) re-opens any
//! blocked dependent whose remaining dependencies are all satisfied. Every
//! transition recomputes the owning plan's status.

use crate::db::models::{now_rfc3339, Task, TaskStatus};
use crate::db::repositories::TaskRepository;
use crate::db::DatabasePool;
use crate::services::plan::PlanService;
use crate::{OrchestratorError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Optional fields accompanying a status change
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub progress: Option<i64>,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// A task transitioned to `timeout` by the periodic sweep
#[derive(Debug, Clone)]
pub struct TimedOutTask {
    pub task_id: String,
    pub message: String,
}

/// Service for plan tasks
#[derive(Clone)]
pub struct TaskService {
    pool: DatabasePool,
    plans: PlanService,
}

impl TaskService {
    pub fn new(pool: DatabasePool) -> Self {
        let plans = PlanService::new(pool.clone());
        Self { pool, plans }
    }

    /// Get a task or fail with `NotFound`
    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        TaskRepository::get_by_id(&self.pool, task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("Task not found: {task_id}")))
    }

    /// Set a task status with its side effects
    pub async fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        update: TaskUpdate,
    ) -> Result<Task> {
        let mut task = self.get_task(task_id).await?;
        let previous = task.task_status();

        task.status = status.as_str().to_string();
        if let Some(progress) = update.progress {
            task.progress = progress;
        }
        if let Some(message) = update.message {
            task.error_message = Some(message);
        }
        if let Some(result) = update.result {
            task.result = Some(result.to_string());
        }

        let now = now_rfc3339();
        if matches!(status, TaskStatus::InProgress | TaskStatus::Retrying)
            && task.started_at.is_none()
        {
            task.started_at = Some(now.clone());
        }
        if status.is_terminal() && task.completed_at.is_none() {
            task.completed_at = Some(now);
        }

        let task = TaskRepository::update(&self.pool, &task).await?;

        if matches!(
            status,
            TaskStatus::Failed | TaskStatus::Aborted | TaskStatus::Timeout
        ) {
            self.block_dependents(&task).await?;
        }
        if status.is_satisfied() || previous == TaskStatus::Blocked {
            self.unblock_ready_tasks(&task.plan_id).await?;
        }

        self.plans.recompute_status(&task.plan_id).await?;
        Ok(task)
    }

    /// Bump the retry counter and mark the task `retrying`
    pub async fn retry_task(&self, task_id: &str, max_retries: i64) -> Result<Task> {
        let mut task = self.get_task(task_id).await?;
        task.retry_count = (task.retry_count + 1).min(max_retries);
        TaskRepository::update(&self.pool, &task).await?;
        self.set_status(task_id, TaskStatus::Retrying, TaskUpdate::default())
            .await
    }

    /// Reset a task to a clean pending state
    pub async fn reset_task_for_retry(&self, task_id: &str) -> Result<Task> {
        let mut task = self.get_task(task_id).await?;
        task.status = TaskStatus::Pending.as_str().to_string();
        task.progress = 0;
        task.retry_count = 0;
        task.error_message = None;
        task.result = None;
        task.started_at = None;
        task.completed_at = None;
        let task = TaskRepository::update(&self.pool, &task).await?;
        self.plans.recompute_status(&task.plan_id).await?;
        Ok(task)
    }

    /// Skip a task, unblocking dependents
    pub async fn skip_task(&self, task_id: &str, reason: Option<String>) -> Result<Task> {
        self.set_status(
            task_id,
            TaskStatus::Skipped,
            TaskUpdate {
                message: reason,
                ..Default::default()
            },
        )
        .await
    }

    /// Replace the description and reset for another attempt
    pub async fn modify_task_and_retry(&self, task_id: &str, description: &str) -> Result<Task> {
        let mut task = self.get_task(task_id).await?;
        if task.description.as_deref() != Some(description) {
            task.description = Some(description.to_string());
            TaskRepository::update(&self.pool, &task).await?;
        }
        self.reset_task_for_retry(task_id).await
    }

    /// Transition tasks stuck `in_progress`/`retrying` beyond the window to
    /// `timeout`
    pub async fn cleanup_timeout_tasks(
        &self,
        plan_id: &str,
        timeout_minutes: i64,
    ) -> Result<Vec<TimedOutTask>> {
        let cutoff = Utc::now() - Duration::minutes(timeout_minutes);
        let mut timed_out = Vec::new();

        for task in self.plans.list_tasks(plan_id).await? {
            if !matches!(
                task.task_status(),
                TaskStatus::InProgress | TaskStatus::Retrying
            ) {
                continue;
            }
            let Some(started_raw) = task.started_at.as_deref() else {
                continue;
            };
            let Ok(started_at) = DateTime::parse_from_rfc3339(started_raw) else {
                continue;
            };
            if started_at.with_timezone(&Utc) >= cutoff {
                continue;
            }

            let message = format!("timeout after {timeout_minutes}m");
            self.set_status(
                &task.id,
                TaskStatus::Timeout,
                TaskUpdate {
                    message: Some(message.clone()),
                    ..Default::default()
                },
            )
            .await?;
            timed_out.push(TimedOutTask {
                task_id: task.id,
                message,
            });
        }
        Ok(timed_out)
    }

    /// Move open dependents of a dead task to `blocked`; returns their ids
    ///
    /// Every non-terminal dependent is forced to `blocked`, including one
    /// that was mid-flight (`in_progress`, `retrying`) or already blocked.
    pub async fn block_dependents(&self, task: &Task) -> Result<Vec<String>> {
        let mut blocked = Vec::new();
        for mut candidate in self.plans.list_tasks(&task.plan_id).await? {
            if candidate.task_status().is_terminal() {
                continue;
            }
            if !candidate.dependency_ids().contains(&task.id) {
                continue;
            }
            candidate.status = TaskStatus::Blocked.as_str().to_string();
            TaskRepository::update(&self.pool, &candidate).await?;
            blocked.push(candidate.id);
        }
        Ok(blocked)
    }

    /// Re-open blocked tasks whose dependencies are now all satisfied
    pub async fn unblock_ready_tasks(&self, plan_id: &str) -> Result<Vec<String>> {
        let tasks = self.plans.list_tasks(plan_id).await?;
        let status_by_id: HashMap<String, TaskStatus> = tasks
            .iter()
            .map(|task| (task.id.clone(), task.task_status()))
            .collect();

        let mut unblocked = Vec::new();
        for mut task in tasks {
            if task.task_status() != TaskStatus::Blocked {
                continue;
            }
            let ready = task.dependency_ids().iter().all(|dep| {
                status_by_id
                    .get(dep)
                    .map(TaskStatus::is_satisfied)
                    .unwrap_or(true)
            });
            if !ready {
                continue;
            }
            task.status = TaskStatus::Pending.as_str().to_string();
            TaskRepository::update(&self.pool, &task).await?;
            unblocked.push(task.id);
        }
        Ok(unblocked)
    }
}
