//! Product doc and history handlers

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;
use crate::db::models::{ProductDoc, ProductDocHistory, ProductDocStatus};
use crate::services::product_doc::ProductDocService;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateProductDocRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub structured: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductDocRequest {
    pub content: Option<String>,
    pub structured: Option<serde_json::Value>,
    pub change_summary: Option<String>,
    pub affected_pages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub include_released: bool,
}

async fn doc_for_session(state: &AppState, session_id: &str) -> ApiResult<ProductDoc> {
    ProductDocService::new(state.pool().clone())
        .get_by_session(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("ProductDoc not found".to_string()))
}

/// POST /api/sessions/:id/product-doc
pub async fn create_product_doc(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CreateProductDocRequest>,
) -> ApiResult<impl IntoResponse> {
    let doc = ProductDocService::new(state.pool().clone())
        .create(
            &session_id,
            &request.content,
            request.structured,
            ProductDocStatus::Draft,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /api/sessions/:id/product-doc
pub async fn get_product_doc(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ProductDoc>> {
    Ok(Json(doc_for_session(&state, &session_id).await?))
}

/// PUT /api/sessions/:id/product-doc
pub async fn update_product_doc(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateProductDocRequest>,
) -> ApiResult<Json<ProductDoc>> {
    let doc = doc_for_session(&state, &session_id).await?;
    let updated = ProductDocService::new(state.pool().clone())
        .update(
            &doc.id,
            request.content.as_deref(),
            request.structured,
            request.change_summary.as_deref(),
            request.affected_pages,
        )
        .await?;
    Ok(Json(updated))
}

/// POST /api/sessions/:id/product-doc/confirm
pub async fn confirm_product_doc(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ProductDoc>> {
    let doc = doc_for_session(&state, &session_id).await?;
    Ok(Json(
        ProductDocService::new(state.pool().clone()).confirm(&doc.id).await?,
    ))
}

/// POST /api/sessions/:id/product-doc/outdated
pub async fn outdate_product_doc(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ProductDoc>> {
    let doc = doc_for_session(&state, &session_id).await?;
    Ok(Json(
        ProductDocService::new(state.pool().clone())
            .mark_outdated(&doc.id)
            .await?,
    ))
}

/// GET /api/sessions/:id/product-doc/history
pub async fn list_product_doc_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<ProductDocHistory>>> {
    let doc = doc_for_session(&state, &session_id).await?;
    Ok(Json(
        ProductDocService::new(state.pool().clone())
            .get_history(&doc.id, query.include_released)
            .await?,
    ))
}

/// POST /api/product-doc/history/:history_id/pin
pub async fn pin_history(
    State(state): State<AppState>,
    Path(history_id): Path<i64>,
) -> ApiResult<Json<ProductDocHistory>> {
    Ok(Json(
        ProductDocService::new(state.pool().clone())
            .pin_history(history_id)
            .await?,
    ))
}

/// POST /api/product-doc/history/:history_id/unpin
pub async fn unpin_history(
    State(state): State<AppState>,
    Path(history_id): Path<i64>,
) -> ApiResult<Json<ProductDocHistory>> {
    Ok(Json(
        ProductDocService::new(state.pool().clone())
            .unpin_history(history_id)
            .await?,
    ))
}
