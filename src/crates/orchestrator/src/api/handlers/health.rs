//! Health endpoint

use crate::api::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "error": error.to_string()})),
        ),
    }
}
