//! Task repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::Task;

/// Task repository for managing plan task rows
pub struct TaskRepository;

impl TaskRepository {
    /// Insert a task row
    pub async fn create(pool: &DatabasePool, task: &Task) -> Result<Task, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            "INSERT INTO tasks (id, plan_id, title, description, agent_type, status, progress,
                                depends_on, can_parallel, retry_count, error_message, result,
                                started_at, completed_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&task.id)
        .bind(&task.plan_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.agent_type)
        .bind(&task.status)
        .bind(task.progress)
        .bind(&task.depends_on)
        .bind(task.can_parallel)
        .bind(task.retry_count)
        .bind(&task.error_message)
        .bind(&task.result)
        .bind(&task.started_at)
        .bind(&task.completed_at)
        .bind(&task.created_at)
        .fetch_one(pool)
        .await
    }

    /// Get a task by id
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks of a plan in creation order
    pub async fn list_by_plan(
        pool: &DatabasePool,
        plan_id: &str,
    ) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE plan_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(plan_id)
        .fetch_all(pool)
        .await
    }

    /// Tasks of a plan currently in the given status
    pub async fn list_by_status(
        pool: &DatabasePool,
        plan_id: &str,
        status: &str,
    ) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE plan_id = ? AND status = ? ORDER BY created_at ASC",
        )
        .bind(plan_id)
        .bind(status)
        .fetch_all(pool)
        .await
    }

    /// Persist every mutable column of a task row
    pub async fn update(pool: &DatabasePool, task: &Task) -> Result<Task, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            "UPDATE tasks SET title = ?, description = ?, agent_type = ?, status = ?,
                              progress = ?, depends_on = ?, can_parallel = ?, retry_count = ?,
                              error_message = ?, result = ?, started_at = ?, completed_at = ?
             WHERE id = ?
             RETURNING *",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.agent_type)
        .bind(&task.status)
        .bind(task.progress)
        .bind(&task.depends_on)
        .bind(task.can_parallel)
        .bind(task.retry_count)
        .bind(&task.error_message)
        .bind(&task.result)
        .bind(&task.started_at)
        .bind(&task.completed_at)
        .bind(&task.id)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{now_rfc3339, Plan, Session};
    use crate::db::repositories::{PlanRepository, SessionRepository};
    use crate::db::schema::test_pool;

    pub(crate) fn task_for(plan_id: &str, id: &str) -> Task {
        Task {
            id: id.to_string(),
            plan_id: plan_id.to_string(),
            title: format!("task {id}"),
            description: None,
            agent_type: Some("generation".to_string()),
            status: "pending".to_string(),
            progress: 0,
            depends_on: None,
            can_parallel: true,
            retry_count: 0,
            error_message: None,
            result: None,
            started_at: None,
            completed_at: None,
            created_at: now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_task_crud() {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();
        let now = now_rfc3339();
        PlanRepository::create(
            &pool,
            &Plan {
                id: "p1".to_string(),
                session_id: "s1".to_string(),
                goal: "g".to_string(),
                status: "pending".to_string(),
                created_at: now.clone(),
                updated_at: now,
            },
        )
        .await
        .unwrap();

        let mut task = TaskRepository::create(&pool, &task_for("p1", "t1")).await.unwrap();
        assert_eq!(task.status, "pending");

        task.status = "in_progress".to_string();
        task.progress = 40;
        let updated = TaskRepository::update(&pool, &task).await.unwrap();
        assert_eq!(updated.progress, 40);

        let in_progress = TaskRepository::list_by_status(&pool, "p1", "in_progress")
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 1);
    }
}
