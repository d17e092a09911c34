//! Page and page-version handlers

use crate::api::error::ApiResult;
use crate::api::routes::AppState;
use crate::db::models::{Page, PageVersion};
use crate::services::page::{NewPage, PageService, PageVersionService};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreatePageRequest {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order_index: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePageRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub order_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListVersionsQuery {
    #[serde(default)]
    pub include_released: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub global_style_css: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub version: PageVersion,
    pub html: String,
}

/// POST /api/sessions/:id/pages
pub async fn create_page(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CreatePageRequest>,
) -> ApiResult<impl IntoResponse> {
    let page = PageService::new(state.pool().clone())
        .create_page(
            &session_id,
            NewPage {
                title: request.title,
                slug: request.slug,
                description: request.description,
                order_index: request.order_index,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(page)))
}

/// GET /api/sessions/:id/pages
pub async fn list_pages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<Page>>> {
    Ok(Json(
        PageService::new(state.pool().clone())
            .list_pages(&session_id)
            .await?,
    ))
}

/// GET /api/pages/:id
pub async fn get_page(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
) -> ApiResult<Json<Page>> {
    Ok(Json(
        PageService::new(state.pool().clone()).get_page(&page_id).await?,
    ))
}

/// PUT /api/pages/:id
pub async fn update_page(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Json(request): Json<UpdatePageRequest>,
) -> ApiResult<Json<Page>> {
    let page = PageService::new(state.pool().clone())
        .update_page(
            &page_id,
            request.title,
            request.description,
            request.order_index,
        )
        .await?;
    Ok(Json(page))
}

/// DELETE /api/pages/:id
pub async fn delete_page(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    PageService::new(state.pool().clone())
        .delete_page(&page_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/pages/:id/versions
pub async fn list_page_versions(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Query(query): Query<ListVersionsQuery>,
) -> ApiResult<Json<Vec<PageVersion>>> {
    Ok(Json(
        PageVersionService::new(state.pool().clone())
            .list_versions(&page_id, query.include_released)
            .await?,
    ))
}

/// GET /api/pages/:id/versions/:version_id
pub async fn preview_page_version(
    State(state): State<AppState>,
    Path((page_id, version_id)): Path<(String, i64)>,
) -> ApiResult<Json<PageVersion>> {
    Ok(Json(
        PageVersionService::new(state.pool().clone())
            .preview_version(&page_id, version_id)
            .await?,
    ))
}

/// POST /api/pages/:id/preview
pub async fn build_page_preview(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    let (version, html) = PageVersionService::new(state.pool().clone())
        .build_preview(&page_id, request.global_style_css.as_deref())
        .await?;
    Ok(Json(PreviewResponse { version, html }))
}

/// POST /api/pages/:id/versions/:version_id/pin
pub async fn pin_page_version(
    State(state): State<AppState>,
    Path((page_id, version_id)): Path<(String, i64)>,
) -> ApiResult<Json<PageVersion>> {
    Ok(Json(
        PageVersionService::new(state.pool().clone())
            .pin_version(&page_id, version_id)
            .await?,
    ))
}

/// POST /api/pages/:id/versions/:version_id/unpin
pub async fn unpin_page_version(
    State(state): State<AppState>,
    Path((page_id, version_id)): Path<(String, i64)>,
) -> ApiResult<Json<PageVersion>> {
    Ok(Json(
        PageVersionService::new(state.pool().clone())
            .unpin_version(&page_id, version_id)
            .await?,
    ))
}
