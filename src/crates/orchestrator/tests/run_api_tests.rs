//! End-to-end tests for the run lifecycle HTTP API: idempotency keys, cancel
//! semantics, resume conflicts, and event delivery in both JSON and SSE form.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use orchestrator::api::create_router;
use orchestrator::config::Settings;
use orchestrator::db::models::{now_rfc3339, Session};
use orchestrator::db::repositories::{EventRepository, SessionRepository};
use orchestrator::db::DatabaseConnection;
use orchestrator::services::run::{RunService, RunUpdate};
use orchestrator::db::models::RunStatus;
use serde_json::{json, Value};
use tower::util::ServiceExt;

struct TestApp {
    router: Router,
    db: DatabaseConnection,
}

async fn test_app(settings: Settings) -> TestApp {
    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    db.run_migrations().await.unwrap();
    SessionRepository::create(db.pool(), &Session::new("S".to_string(), "test".to_string()))
        .await
        .unwrap();
    TestApp {
        router: create_router(db.clone(), settings),
        db,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value, bytes.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json_with_key(uri: &str, body: Value, key: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("Idempotency-Key", key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_create_run_returns_queued_record() {
    let app = test_app(Settings::default()).await;
    let (status, body, _) = send(
        &app.router,
        post_json("/api/runs", json!({"session_id": "S", "message": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["session_id"], "S");
    let run_id = body["run_id"].as_str().unwrap();
    assert_eq!(
        body["checkpoint_thread"],
        Value::String(format!("S:{run_id}"))
    );
}

#[tokio::test]
async fn test_create_run_unknown_session_404() {
    let app = test_app(Settings::default()).await;
    let (status, _, _) = send(
        &app.router,
        post_json("/api/runs", json!({"session_id": "ghost", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_api_disabled_returns_404() {
    let settings = Settings {
        run_api_enabled: false,
        ..Default::default()
    };
    let app = test_app(settings).await;
    let (status, _, _) = send(
        &app.router,
        post_json("/api/runs", json!({"session_id": "S", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_idempotency_key_returns_identical_body() {
    let app = test_app(Settings::default()).await;
    let body = json!({"session_id": "S", "message": "hello"});

    let (first_status, first, first_bytes) = send(
        &app.router,
        post_json_with_key("/api/runs", body.clone(), "create-1"),
    )
    .await;
    let (second_status, second, second_bytes) = send(
        &app.router,
        post_json_with_key("/api/runs", body, "create-1"),
    )
    .await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(first["run_id"], second["run_id"]);
    assert_eq!(first_bytes, second_bytes);

    // Only one run row exists.
    let runs = RunService::new(app.db.pool().clone())
        .list_runs("S")
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let app = test_app(Settings::default()).await;
    let (_, created, _) = send(
        &app.router,
        post_json("/api/runs", json!({"session_id": "S", "message": "go"})),
    )
    .await;
    let run_id = created["run_id"].as_str().unwrap().to_string();

    let runs = RunService::new(app.db.pool().clone());
    runs.start_run(&run_id).await.unwrap();

    let (status, body, _) = send(
        &app.router,
        post_json(&format!("/api/runs/{run_id}/cancel"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "cancelled");

    let (status, body, _) = send(
        &app.router,
        post_json(&format!("/api/runs/{run_id}/cancel"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn test_resume_conflicts_and_bad_payload() {
    let app = test_app(Settings::default()).await;
    let (_, created, _) = send(
        &app.router,
        post_json("/api/runs", json!({"session_id": "S", "message": "go"})),
    )
    .await;
    let run_id = created["run_id"].as_str().unwrap().to_string();

    // Not waiting_input: 409.
    let (status, _, _) = send(
        &app.router,
        post_json(
            &format!("/api/runs/{run_id}/resume"),
            json!({"resume": {"user_feedback": "x"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Malformed payload: 422.
    let (status, _, _) = send(
        &app.router,
        post_json(&format!("/api/runs/{run_id}/resume"), json!({"resume": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_resume_waiting_run_succeeds_and_honors_idempotency() {
    let app = test_app(Settings::default()).await;
    let (_, created, _) = send(
        &app.router,
        post_json("/api/runs", json!({"session_id": "S", "message": "go"})),
    )
    .await;
    let run_id = created["run_id"].as_str().unwrap().to_string();

    let runs = RunService::new(app.db.pool().clone());
    runs.start_run(&run_id).await.unwrap();
    runs.persist_run_state(&run_id, RunStatus::WaitingInput, RunUpdate::default())
        .await
        .unwrap();

    let body = json!({"resume": {"user_feedback": "improve spacing"}});
    let (status, first, first_bytes) = send(
        &app.router,
        post_json_with_key(&format!("/api/runs/{run_id}/resume"), body.clone(), "resume-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "running");

    // Replay with the same key: same body, no second transition attempt.
    let (status, _, second_bytes) = send(
        &app.router,
        post_json_with_key(&format!("/api/runs/{run_id}/resume"), body, "resume-1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first_bytes, second_bytes);
}

async fn seed_terminal_run_with_events(app: &TestApp) -> String {
    let runs = RunService::new(app.db.pool().clone());
    let run = runs
        .create_run(
            "S",
            orchestrator::services::run::CreateRunParams {
                message: "go".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    runs.start_run(&run.id).await.unwrap();

    EventRepository::append(
        app.db.pool(),
        "S",
        Some(&run.id),
        "run_started",
        &json!({}),
        "session",
    )
    .await
    .unwrap();
    EventRepository::append(
        app.db.pool(),
        "S",
        Some("OTHER"),
        "run_started",
        &json!({}),
        "session",
    )
    .await
    .unwrap();
    EventRepository::append(
        app.db.pool(),
        "S",
        Some(&run.id),
        "task_progress",
        &json!({}),
        "session",
    )
    .await
    .unwrap();

    runs.persist_run_state(&run.id, RunStatus::Completed, RunUpdate::default())
        .await
        .unwrap();
    run.id
}

#[tokio::test]
async fn test_json_events_filter_by_run_and_since_seq() {
    let app = test_app(Settings::default()).await;
    let run_id = seed_terminal_run_with_events(&app).await;

    let (status, body, _) = send(&app.router, get(&format!("/api/runs/{run_id}/events"))).await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["seq"], 1);
    assert_eq!(events[1]["seq"], 3);
    assert_eq!(body["last_seq"], 3);
    assert_eq!(body["has_more"], false);

    let (_, body, _) = send(
        &app.router,
        get(&format!("/api/runs/{run_id}/events?since_seq=1")),
    )
    .await;
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["seq"], 3);
}

#[tokio::test]
async fn test_sse_stream_frames_and_done_marker() {
    let app = test_app(Settings::default()).await;
    let run_id = seed_terminal_run_with_events(&app).await;

    let request = Request::builder()
        .uri(format!("/api/runs/{run_id}/events"))
        .header(header::ACCEPT, "text/event-stream")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let frames: Vec<&str> = text
        .split("\n\n")
        .filter(|frame| frame.starts_with("data: "))
        .collect();
    assert_eq!(frames.len(), 3);
    assert!(frames[0].contains("\"seq\":1"));
    assert!(frames[1].contains("\"seq\":3"));
    assert_eq!(frames[2], "data: [DONE]");
}

#[tokio::test]
async fn test_session_events_endpoint_paginates() {
    let app = test_app(Settings::default()).await;
    for index in 0..3 {
        EventRepository::append(
            app.db.pool(),
            "S",
            None,
            "task_progress",
            &json!({"index": index}),
            "session",
        )
        .await
        .unwrap();
    }

    let (status, body, _) = send(&app.router, get("/api/sessions/S/events?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["last_seq"], 2);
}

#[tokio::test]
async fn test_pinned_limit_conflict_payload() {
    let app = test_app(Settings::default()).await;
    let pool = app.db.pool().clone();

    // A doc and three snapshots to pin.
    orchestrator::services::product_doc::ProductDocService::new(pool.clone())
        .create("S", "# doc", None, orchestrator::db::models::ProductDocStatus::Draft)
        .await
        .unwrap();
    let snapshots = orchestrator::services::snapshot::SnapshotService::new(pool);
    let n1 = snapshots
        .create_snapshot("S", orchestrator::db::models::VersionSource::Manual, None)
        .await
        .unwrap();
    let n2 = snapshots
        .create_snapshot("S", orchestrator::db::models::VersionSource::Manual, None)
        .await
        .unwrap();
    let n3 = snapshots
        .create_snapshot("S", orchestrator::db::models::VersionSource::Manual, None)
        .await
        .unwrap();

    for id in [&n1.id, &n2.id] {
        let (status, _, _) = send(
            &app.router,
            post_json(&format!("/api/snapshots/{id}/pin"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body, _) = send(
        &app.router,
        post_json(&format!("/api/snapshots/{}/pin", n3.id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let current_pinned = body["current_pinned"].as_array().unwrap();
    assert_eq!(current_pinned.len(), 2);
    assert!(current_pinned.contains(&json!(n1.id)));
    assert!(current_pinned.contains(&json!(n2.id)));
}

#[tokio::test]
async fn test_page_crud_and_preview_over_http() {
    let app = test_app(Settings::default()).await;

    let (status, page, _) = send(
        &app.router,
        post_json(
            "/api/sessions/S/pages",
            json!({"title": "Home", "slug": "home"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let page_id = page["id"].as_str().unwrap().to_string();

    // Invalid slug is a 422.
    let (status, _, _) = send(
        &app.router,
        post_json(
            "/api/sessions/S/pages",
            json!({"title": "Bad", "slug": "Not Valid"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    orchestrator::services::page::PageVersionService::new(app.db.pool().clone())
        .create_version(
            &page_id,
            "<html><head></head><body>hi</body></html>",
            orchestrator::db::models::VersionSource::Auto,
            None,
        )
        .await
        .unwrap();

    let (status, preview, _) = send(
        &app.router,
        post_json(
            &format!("/api/pages/{page_id}/preview"),
            json!({"global_style_css": "body { margin: 0; }"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(preview["html"].as_str().unwrap().contains("margin: 0"));
}

#[tokio::test]
async fn test_event_timestamps_are_utc_iso8601() {
    let app = test_app(Settings::default()).await;
    let run_id = seed_terminal_run_with_events(&app).await;
    let (_, body, _) = send(&app.router, get(&format!("/api/runs/{run_id}/events"))).await;

    let created_at = body["events"][0]["created_at"].as_str().unwrap();
    let parsed = chrono::DateTime::parse_from_rfc3339(created_at).unwrap();
    assert!(parsed.timestamp() <= chrono::DateTime::parse_from_rfc3339(&now_rfc3339()).unwrap().timestamp());
}
