//! Plan repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::{now_rfc3339, Plan};

/// Plan repository for managing plan rows
pub struct PlanRepository;

impl PlanRepository {
    /// Insert a plan row
    pub async fn create(pool: &DatabasePool, plan: &Plan) -> Result<Plan, sqlx::Error> {
        sqlx::query_as::<_, Plan>(
            "INSERT INTO plans (id, session_id, goal, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&plan.id)
        .bind(&plan.session_id)
        .bind(&plan.goal)
        .bind(&plan.status)
        .bind(&plan.created_at)
        .bind(&plan.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Get a plan by id
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List plans for a session, newest first
    pub async fn list_by_session(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Vec<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE session_id = ? ORDER BY created_at DESC",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
    }

    /// Update plan status
    pub async fn update_status(
        pool: &DatabasePool,
        id: &str,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE plans SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now_rfc3339())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Session;
    use crate::db::repositories::SessionRepository;
    use crate::db::schema::test_pool;

    #[tokio::test]
    async fn test_plan_crud() {
        let pool = test_pool().await;
        SessionRepository::create(&pool, &Session::new("s1".to_string(), "t".to_string()))
            .await
            .unwrap();

        let now = now_rfc3339();
        let plan = Plan {
            id: "p1".to_string(),
            session_id: "s1".to_string(),
            goal: "generate the site".to_string(),
            status: "pending".to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        PlanRepository::create(&pool, &plan).await.unwrap();

        PlanRepository::update_status(&pool, "p1", "in_progress")
            .await
            .unwrap();
        let fetched = PlanRepository::get_by_id(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(fetched.status, "in_progress");

        let listed = PlanRepository::list_by_session(&pool, "s1").await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
