//! Plan service: plan rows and status recomputation from task states

use crate::db::models::{now_rfc3339, Plan, PlanStatus, Task, TaskStatus};
use crate::db::repositories::{PlanRepository, SessionRepository, TaskRepository};
use crate::db::DatabasePool;
use crate::{OrchestratorError, Result};
use uuid::Uuid;

/// One task requested when creating a plan
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub agent_type: Option<String>,
    pub depends_on: Vec<String>,
    pub can_parallel: bool,
}

/// Service for plans
#[derive(Clone)]
pub struct PlanService {
    pool: DatabasePool,
}

impl PlanService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a plan with its tasks
    ///
    /// Task ids referenced in `depends_on` are indexes into the batch
    /// ("0", "1", ...) or explicit task ids; indexes are resolved to the
    /// generated ids.
    pub async fn create_plan(
        &self,
        session_id: &str,
        goal: &str,
        tasks: Vec<NewTask>,
    ) -> Result<Plan> {
        if SessionRepository::get_by_id(&self.pool, session_id).await?.is_none() {
            return Err(OrchestratorError::NotFound("Session not found".to_string()));
        }

        let now = now_rfc3339();
        let plan = Plan {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            goal: goal.to_string(),
            status: PlanStatus::Pending.as_str().to_string(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        let plan = PlanRepository::create(&self.pool, &plan).await?;

        let ids: Vec<String> = tasks
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        for (index, spec) in tasks.into_iter().enumerate() {
            let depends_on: Vec<String> = spec
                .depends_on
                .iter()
                .map(|dep| match dep.parse::<usize>() {
                    Ok(position) if position < ids.len() => ids[position].clone(),
                    _ => dep.clone(),
                })
                .collect();
            let task = Task {
                id: ids[index].clone(),
                plan_id: plan.id.clone(),
                title: spec.title,
                description: spec.description,
                agent_type: spec.agent_type,
                status: TaskStatus::Pending.as_str().to_string(),
                progress: 0,
                depends_on: if depends_on.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&depends_on)?)
                },
                can_parallel: spec.can_parallel,
                retry_count: 0,
                error_message: None,
                result: None,
                started_at: None,
                completed_at: None,
                created_at: now_rfc3339(),
            };
            TaskRepository::create(&self.pool, &task).await?;
        }
        Ok(plan)
    }

    /// Get a plan or fail with `NotFound`
    pub async fn get_plan(&self, plan_id: &str) -> Result<Plan> {
        PlanRepository::get_by_id(&self.pool, plan_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound("Plan not found".to_string()))
    }

    /// Plans of a session, newest first
    pub async fn list_plans(&self, session_id: &str) -> Result<Vec<Plan>> {
        Ok(PlanRepository::list_by_session(&self.pool, session_id).await?)
    }

    /// Tasks of a plan in creation order
    pub async fn list_tasks(&self, plan_id: &str) -> Result<Vec<Task>> {
        Ok(TaskRepository::list_by_plan(&self.pool, plan_id).await?)
    }

    /// Derive the plan status from its task states
    pub async fn recompute_status(&self, plan_id: &str) -> Result<PlanStatus> {
        let tasks = self.list_tasks(plan_id).await?;
        let statuses: Vec<TaskStatus> = tasks.iter().map(Task::task_status).collect();

        let next = if statuses.is_empty() {
            PlanStatus::Pending
        } else if statuses.iter().any(|status| *status == TaskStatus::Aborted) {
            PlanStatus::Aborted
        } else if statuses.iter().all(TaskStatus::is_satisfied) {
            PlanStatus::Done
        } else if statuses
            .iter()
            .any(|status| matches!(status, TaskStatus::InProgress | TaskStatus::Retrying))
        {
            PlanStatus::InProgress
        } else if statuses
            .iter()
            .any(|status| matches!(status, TaskStatus::Failed | TaskStatus::Timeout))
            && statuses.iter().all(TaskStatus::is_terminal)
        {
            PlanStatus::Failed
        } else {
            let plan = self.get_plan(plan_id).await?;
            let current = plan.plan_status();
            if current == PlanStatus::Pending {
                PlanStatus::Pending
            } else {
                PlanStatus::InProgress
            }
        };

        PlanRepository::update_status(&self.pool, plan_id, next.as_str()).await?;
        Ok(next)
    }

    /// Abort a plan and every non-terminal task in it
    pub async fn abort_plan(&self, plan_id: &str) -> Result<Plan> {
        let plan = self.get_plan(plan_id).await?;
        for mut task in self.list_tasks(plan_id).await? {
            if task.task_status().is_terminal() {
                continue;
            }
            task.status = TaskStatus::Aborted.as_str().to_string();
            if task.completed_at.is_none() {
                task.completed_at = Some(now_rfc3339());
            }
            TaskRepository::update(&self.pool, &task).await?;
        }
        PlanRepository::update_status(&self.pool, plan_id, PlanStatus::Aborted.as_str()).await?;
        self.get_plan(&plan.id).await
    }
}
