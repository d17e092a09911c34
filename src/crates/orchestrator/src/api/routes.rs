//! API route definitions

use crate::api::handlers;
use crate::config::Settings;
use crate::db::{DatabaseConnection, DatabasePool};
use crate::services::idempotency::IdempotencyCache;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub settings: Settings,
    pub idempotency: IdempotencyCache,
}

impl AppState {
    pub fn pool(&self) -> &DatabasePool {
        self.db.pool()
    }
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let wildcard = settings.cors_allow_origins.iter().any(|origin| origin == "*");
    let mut layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if wildcard {
        // Settings already force credentials off for wildcard origins.
        layer = layer.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = settings
            .cors_allow_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer = layer.allow_origin(AllowOrigin::list(origins));
        if settings.cors_allow_credentials {
            layer = layer.allow_credentials(true);
        }
    }
    layer
}

/// Build the complete API router
pub fn create_router(db: DatabaseConnection, settings: Settings) -> Router {
    let cors = cors_layer(&settings);
    let app_state = AppState {
        db,
        settings,
        idempotency: IdempotencyCache::new(),
    };

    Router::new()
        // Health
        .route("/health", get(handlers::health::health))
        // Runs
        .route("/api/runs", post(handlers::runs::create_run))
        .route("/api/runs/:id", get(handlers::runs::get_run))
        .route("/api/runs/:id/resume", post(handlers::runs::resume_run))
        .route("/api/runs/:id/cancel", post(handlers::runs::cancel_run))
        .route("/api/runs/:id/events", get(handlers::runs::get_run_events))
        // Sessions
        .route(
            "/api/sessions",
            post(handlers::sessions::create_session).get(handlers::sessions::list_sessions),
        )
        .route(
            "/api/sessions/:id",
            get(handlers::sessions::get_session)
                .put(handlers::sessions::update_session)
                .delete(handlers::sessions::delete_session),
        )
        .route(
            "/api/sessions/:id/events",
            get(handlers::events::get_session_events),
        )
        // Pages
        .route(
            "/api/sessions/:id/pages",
            post(handlers::pages::create_page).get(handlers::pages::list_pages),
        )
        .route(
            "/api/pages/:id",
            get(handlers::pages::get_page)
                .put(handlers::pages::update_page)
                .delete(handlers::pages::delete_page),
        )
        .route(
            "/api/pages/:id/versions",
            get(handlers::pages::list_page_versions),
        )
        .route(
            "/api/pages/:id/versions/:version_id",
            get(handlers::pages::preview_page_version),
        )
        .route(
            "/api/pages/:id/preview",
            post(handlers::pages::build_page_preview),
        )
        .route(
            "/api/pages/:id/versions/:version_id/pin",
            post(handlers::pages::pin_page_version),
        )
        .route(
            "/api/pages/:id/versions/:version_id/unpin",
            post(handlers::pages::unpin_page_version),
        )
        // Product doc
        .route(
            "/api/sessions/:id/product-doc",
            post(handlers::product_doc::create_product_doc)
                .get(handlers::product_doc::get_product_doc)
                .put(handlers::product_doc::update_product_doc),
        )
        .route(
            "/api/sessions/:id/product-doc/confirm",
            post(handlers::product_doc::confirm_product_doc),
        )
        .route(
            "/api/sessions/:id/product-doc/outdated",
            post(handlers::product_doc::outdate_product_doc),
        )
        .route(
            "/api/sessions/:id/product-doc/history",
            get(handlers::product_doc::list_product_doc_history),
        )
        .route(
            "/api/product-doc/history/:history_id/pin",
            post(handlers::product_doc::pin_history),
        )
        .route(
            "/api/product-doc/history/:history_id/unpin",
            post(handlers::product_doc::unpin_history),
        )
        // Snapshots
        .route(
            "/api/sessions/:id/snapshots",
            post(handlers::snapshots::create_snapshot).get(handlers::snapshots::list_snapshots),
        )
        .route("/api/snapshots/:id", get(handlers::snapshots::get_snapshot))
        .route(
            "/api/snapshots/:id/pin",
            post(handlers::snapshots::pin_snapshot),
        )
        .route(
            "/api/snapshots/:id/unpin",
            post(handlers::snapshots::unpin_snapshot),
        )
        .route(
            "/api/sessions/:id/snapshots/:snapshot_id/rollback",
            post(handlers::snapshots::rollback_snapshot),
        )
        // Plans and tasks
        .route(
            "/api/sessions/:id/plans",
            post(handlers::plans::create_plan).get(handlers::plans::list_plans),
        )
        .route("/api/plans/:id", get(handlers::plans::get_plan))
        .route("/api/plans/:id/tasks", get(handlers::plans::list_plan_tasks))
        .route("/api/plans/:id/abort", post(handlers::plans::abort_plan))
        .route("/api/tasks/:id/retry", post(handlers::plans::retry_task))
        .route("/api/tasks/:id/skip", post(handlers::plans::skip_task))
        .route("/api/tasks/:id/modify", post(handlers::plans::modify_task))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
