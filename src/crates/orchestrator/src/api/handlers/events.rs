//! Session-scoped event listing

use crate::api::error::ApiResult;
use crate::api::response::EventsResponse;
use crate::api::routes::AppState;
use crate::events::EventStore;
use crate::services::session::SessionService;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SessionEventsQuery {
    pub since_seq: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/sessions/:id/events
pub async fn get_session_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SessionEventsQuery>,
) -> ApiResult<Json<EventsResponse>> {
    SessionService::new(state.pool().clone())
        .get_session(&session_id)
        .await?;

    let limit = query.limit.unwrap_or(1000).clamp(1, 5000);
    let (events, has_more) = EventStore::new(state.pool().clone())
        .get_events(&session_id, query.since_seq, limit)
        .await?;
    Ok(Json(EventsResponse::new(events, query.since_seq, has_more)))
}
