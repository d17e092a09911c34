//! Plan and task action handlers

use crate::api::error::ApiResult;
use crate::api::routes::AppState;
use crate::db::models::{Plan, Task};
use crate::services::plan::{NewTask, PlanService};
use crate::services::task::TaskService;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NewTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "default_can_parallel")]
    pub can_parallel: bool,
}

fn default_can_parallel() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub goal: String,
    #[serde(default)]
    pub tasks: Vec<NewTaskRequest>,
}

#[derive(Debug, Deserialize)]
pub struct SkipTaskRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModifyTaskRequest {
    pub description: String,
}

/// POST /api/sessions/:id/plans
pub async fn create_plan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CreatePlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let tasks = request
        .tasks
        .into_iter()
        .map(|task| NewTask {
            title: task.title,
            description: task.description,
            agent_type: task.agent_type,
            depends_on: task.depends_on,
            can_parallel: task.can_parallel,
        })
        .collect();
    let plan = PlanService::new(state.pool().clone())
        .create_plan(&session_id, &request.goal, tasks)
        .await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// GET /api/sessions/:id/plans
pub async fn list_plans(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<Plan>>> {
    Ok(Json(
        PlanService::new(state.pool().clone())
            .list_plans(&session_id)
            .await?,
    ))
}

/// GET /api/plans/:id
pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Plan>> {
    Ok(Json(
        PlanService::new(state.pool().clone()).get_plan(&plan_id).await?,
    ))
}

/// GET /api/plans/:id/tasks
pub async fn list_plan_tasks(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(
        PlanService::new(state.pool().clone())
            .list_tasks(&plan_id)
            .await?,
    ))
}

/// POST /api/plans/:id/abort
pub async fn abort_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<Plan>> {
    Ok(Json(
        PlanService::new(state.pool().clone())
            .abort_plan(&plan_id)
            .await?,
    ))
}

/// POST /api/tasks/:id/retry
pub async fn retry_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(
        TaskService::new(state.pool().clone())
            .reset_task_for_retry(&task_id)
            .await?,
    ))
}

/// POST /api/tasks/:id/skip
pub async fn skip_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<SkipTaskRequest>,
) -> ApiResult<Json<Task>> {
    Ok(Json(
        TaskService::new(state.pool().clone())
            .skip_task(&task_id, request.reason)
            .await?,
    ))
}

/// POST /api/tasks/:id/modify
pub async fn modify_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<ModifyTaskRequest>,
) -> ApiResult<Json<Task>> {
    Ok(Json(
        TaskService::new(state.pool().clone())
            .modify_task_and_retry(&task_id, &request.description)
            .await?,
    ))
}
