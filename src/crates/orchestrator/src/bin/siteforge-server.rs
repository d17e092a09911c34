//! siteforge server binary
//!
//! Standalone server exposing the run lifecycle API, session/page/doc/
//! snapshot surfaces, and SSE event streaming.

use orchestrator::api::create_router;
use orchestrator::config::Settings;
use orchestrator::db::DatabaseConnection;
use orchestrator::services::run::RunService;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let settings = Settings::from_env();
    settings.validate()?;

    tracing::info!("Connecting to database: {}", settings.database_url);
    let db = DatabaseConnection::new(&settings.database_url).await?;
    db.run_migrations().await?;

    // Runs left `running` by a previous process can never finish; fail them
    // so callers stop waiting. Parked runs stay resumable.
    let swept = RunService::new(db.pool().clone())
        .sweep_stale_running(settings.run_staleness_minutes)
        .await?;
    if !swept.is_empty() {
        tracing::warn!(count = swept.len(), "recovered stale running runs");
    }

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    tracing::info!("Listening on {addr}");
    tracing::info!("Run API enabled: {}", settings.run_api_enabled);
    tracing::info!("Checkpointer: {:?}", settings.checkpointer_mode);

    let router = create_router(db, settings);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
