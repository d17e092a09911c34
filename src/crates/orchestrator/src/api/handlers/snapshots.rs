//! Project snapshot handlers

use crate::api::error::ApiResult;
use crate::api::routes::AppState;
use crate::db::models::{ProjectSnapshot, SnapshotDoc, SnapshotPage, VersionSource};
use crate::services::snapshot::SnapshotService;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateSnapshotRequest {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListSnapshotsQuery {
    #[serde(default)]
    pub include_released: bool,
}

#[derive(Debug, Serialize)]
pub struct SnapshotDetailResponse {
    pub snapshot: ProjectSnapshot,
    pub doc: Option<SnapshotDoc>,
    pub pages: Vec<SnapshotPage>,
}

/// POST /api/sessions/:id/snapshots
pub async fn create_snapshot(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CreateSnapshotRequest>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = SnapshotService::new(state.pool().clone())
        .create_snapshot(&session_id, VersionSource::Manual, request.label.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/sessions/:id/snapshots
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ListSnapshotsQuery>,
) -> ApiResult<Json<Vec<ProjectSnapshot>>> {
    Ok(Json(
        SnapshotService::new(state.pool().clone())
            .get_snapshots(&session_id, query.include_released)
            .await?,
    ))
}

/// GET /api/snapshots/:id
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
) -> ApiResult<Json<SnapshotDetailResponse>> {
    let service = SnapshotService::new(state.pool().clone());
    let snapshot = service.get_snapshot(&snapshot_id).await?;
    let (doc, pages) = service.get_snapshot_payload(&snapshot_id).await?;
    Ok(Json(SnapshotDetailResponse {
        snapshot,
        doc,
        pages,
    }))
}

/// POST /api/snapshots/:id/pin
pub async fn pin_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
) -> ApiResult<Json<ProjectSnapshot>> {
    Ok(Json(
        SnapshotService::new(state.pool().clone())
            .pin_snapshot(&snapshot_id)
            .await?,
    ))
}

/// POST /api/snapshots/:id/unpin
pub async fn unpin_snapshot(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
) -> ApiResult<Json<ProjectSnapshot>> {
    Ok(Json(
        SnapshotService::new(state.pool().clone())
            .unpin_snapshot(&snapshot_id)
            .await?,
    ))
}

/// POST /api/sessions/:id/snapshots/:snapshot_id/rollback
pub async fn rollback_snapshot(
    State(state): State<AppState>,
    Path((session_id, snapshot_id)): Path<(String, String)>,
) -> ApiResult<Json<ProjectSnapshot>> {
    Ok(Json(
        SnapshotService::new(state.pool().clone())
            .rollback_to_snapshot(&session_id, &snapshot_id)
            .await?,
    ))
}
