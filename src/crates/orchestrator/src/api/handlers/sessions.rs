//! Session CRUD handlers

use crate::api::error::ApiResult;
use crate::api::routes::AppState;
use crate::db::models::Session;
use crate::services::session::SessionService;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: Option<String>,
    pub product_type: Option<String>,
    pub complexity: Option<String>,
    pub skill_id: Option<String>,
    pub doc_tier: Option<String>,
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = SessionService::new(state.pool().clone())
        .create_session(&request.title)
        .await?;
    tracing::info!(session_id = %session.id, "created session");
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Vec<Session>>> {
    Ok(Json(
        SessionService::new(state.pool().clone()).list_sessions().await?,
    ))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Session>> {
    Ok(Json(
        SessionService::new(state.pool().clone())
            .get_session(&session_id)
            .await?,
    ))
}

/// PUT /api/sessions/:id
pub async fn update_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult<Json<Session>> {
    let service = SessionService::new(state.pool().clone());
    if let Some(title) = &request.title {
        service.rename_session(&session_id, title).await?;
    }
    let session = service
        .set_routing(
            &session_id,
            request.product_type,
            request.complexity,
            request.skill_id,
            request.doc_tier,
        )
        .await?;
    Ok(Json(session))
}

/// DELETE /api/sessions/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    SessionService::new(state.pool().clone())
        .delete_session(&session_id)
        .await?;
    tracing::info!(%session_id, "deleted session");
    Ok(StatusCode::NO_CONTENT)
}
