//! Run API handlers
//!
//! Create / Get / Resume / Cancel / Stream events. Create and Resume honor
//! the `Idempotency-Key` header: a repeated key within the TTL returns the
//! prior status and a byte-equal body. The events endpoint answers JSON
//! pagination by default and switches to SSE framing when the client accepts
//! `text/event-stream`.

use crate::api::error::{ApiError, ApiResult};
use crate::api::response::{EventsResponse, RunResponse};
use crate::api::routes::AppState;
use crate::events::{EventRecord, EventStore};
use crate::services::run::{CreateRunParams, RunService};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::Instant;

const SSE_KEEPALIVE: Duration = Duration::from_secs(15);
const SSE_POLL: Duration = Duration::from_millis(500);
const SSE_BATCH: i64 = 200;

/// Body of POST /api/runs
#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub generate_now: bool,
    #[serde(default)]
    pub style_reference: Option<serde_json::Value>,
    #[serde(default)]
    pub target_pages: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since_seq: Option<i64>,
    pub limit: Option<i64>,
}

fn ensure_run_api_enabled(state: &AppState) -> ApiResult<()> {
    if !state.settings.run_api_enabled {
        return Err(ApiError::NotFound("Not found".to_string()));
    }
    Ok(())
}

fn idempotency_key(headers: &HeaderMap) -> String {
    headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn cached_response(status: u16, body: String) -> Response {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn json_response(status: StatusCode, body: &str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Create a run
///
/// POST /api/runs
pub async fn create_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRunRequest>,
) -> ApiResult<Response> {
    ensure_run_api_enabled(&state)?;

    let key = idempotency_key(&headers);
    if let Some((status, body)) = state.idempotency.get("create", &request.session_id, &key) {
        return Ok(cached_response(status, body));
    }

    let service = RunService::new(state.pool().clone());
    let run = service
        .create_run(
            &request.session_id,
            CreateRunParams {
                message: request.message,
                generate_now: request.generate_now,
                style_reference: request.style_reference,
                target_pages: request.target_pages,
                ..Default::default()
            },
        )
        .await?;

    let body = serde_json::to_string(&RunResponse::from(run))
        .map_err(|error| ApiError::InternalError(error.to_string()))?;
    state
        .idempotency
        .put("create", &request.session_id, &key, 201, body.clone());
    Ok(json_response(StatusCode::CREATED, &body))
}

/// Get a run
///
/// GET /api/runs/:id
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunResponse>> {
    ensure_run_api_enabled(&state)?;
    let run = RunService::new(state.pool().clone()).get_run(&run_id).await?;
    Ok(Json(RunResponse::from(run)))
}

/// Resume a waiting run
///
/// POST /api/runs/:id/resume
pub async fn resume_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Response> {
    ensure_run_api_enabled(&state)?;

    let payload = body
        .get("resume_payload")
        .or_else(|| body.get("resume"))
        .cloned()
        .filter(|value| value.is_object())
        .ok_or_else(|| {
            ApiError::ValidationError("resume_payload must be an object".to_string())
        })?;

    let key = idempotency_key(&headers);
    if let Some((status, cached)) = state.idempotency.get("resume", &run_id, &key) {
        return Ok(cached_response(status, cached));
    }

    let run = RunService::new(state.pool().clone())
        .resume_run(&run_id, payload)
        .await?;

    let body = serde_json::to_string(&RunResponse::from(run))
        .map_err(|error| ApiError::InternalError(error.to_string()))?;
    state.idempotency.put("resume", &run_id, &key, 200, body.clone());
    Ok(json_response(StatusCode::OK, &body))
}

/// Cancel a run; 202 on transition, 200 when already terminal
///
/// POST /api/runs/:id/cancel
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Response> {
    ensure_run_api_enabled(&state)?;
    let (run, transitioned) = RunService::new(state.pool().clone())
        .cancel_run(&run_id)
        .await?;
    let status = if transitioned {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RunResponse::from(run))).into_response())
}

/// Run-scoped events: JSON pagination or SSE streaming
///
/// GET /api/runs/:id/events
pub async fn get_run_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    ensure_run_api_enabled(&state)?;

    let service = RunService::new(state.pool().clone());
    let run = service.get_run(&run_id).await?;

    let wants_sse = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_lowercase().contains("text/event-stream"))
        .unwrap_or(false);

    if wants_sse {
        return Ok(stream_run_events(
            state,
            run.session_id.clone(),
            run_id,
            query.since_seq,
        ));
    }

    let limit = query.limit.unwrap_or(1000).clamp(1, 5000);
    let (events, has_more) = EventStore::new(state.pool().clone())
        .get_events_by_run(&run.session_id, &run_id, query.since_seq, limit)
        .await?;
    Ok(Json(EventsResponse::new(events, query.since_seq, has_more)).into_response())
}

/// Chunked SSE delivery: `data:` frames, keepalive comments every 15 s while
/// idle, and a literal `[DONE]` once the run is terminal and drained
fn stream_run_events(
    state: AppState,
    session_id: String,
    run_id: String,
    since_seq: Option<i64>,
) -> Response {
    let pool = state.pool().clone();
    let body_stream = async_stream::stream! {
        let store = EventStore::new(pool.clone());
        let runs = RunService::new(pool);
        let mut last_seq = since_seq;
        let mut last_keepalive = Instant::now();

        loop {
            let Ok(run) = runs.get_run(&run_id).await else {
                break;
            };
            let done = run.is_terminal();

            let events = match store
                .get_events_by_run(&session_id, &run_id, last_seq, SSE_BATCH)
                .await
            {
                Ok((events, _)) => events,
                Err(error) => {
                    tracing::error!(%run_id, %error, "event stream query failed");
                    break;
                }
            };

            if !events.is_empty() {
                last_seq = events.last().map(|event| event.seq).or(last_seq);
                for event in events {
                    let record = EventRecord::from(event);
                    let payload = serde_json::to_string(&record).unwrap_or_default();
                    yield Ok::<Bytes, Infallible>(Bytes::from(format!("data: {payload}\n\n")));
                }
                last_keepalive = Instant::now();
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }

            if done {
                yield Ok(Bytes::from("data: [DONE]\n\n"));
                break;
            }

            if last_keepalive.elapsed() >= SSE_KEEPALIVE {
                yield Ok(Bytes::from(": keepalive\n\n"));
                last_keepalive = Instant::now();
            }
            tokio::time::sleep(SSE_POLL).await;
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
