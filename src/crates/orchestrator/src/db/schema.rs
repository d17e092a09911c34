//! Embedded schema definition
//!
//! All timestamps are RFC3339 strings and all JSON columns are TEXT, matching
//! SQLite's type model. Uniqueness constraints mirror the persisted-state
//! contract: `(session_id, slug)` on pages, `(page_id, version)` on page
//! versions, `(product_doc_id, version)` on doc histories,
//! `(session_id, snapshot_number)` on snapshots, and `(session_id, seq)` plus
//! `(session_id, event_id)` on session events.

use crate::db::DatabasePool;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        product_type TEXT,
        complexity TEXT,
        skill_id TEXT,
        doc_tier TEXT,
        graph_state TEXT,
        build_status TEXT NOT NULL DEFAULT 'pending',
        build_artifacts TEXT,
        aesthetic_scores TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (build_status IN ('pending', 'running', 'success', 'failed'))
    )",
    "CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        parent_run_id TEXT,
        trigger_source TEXT NOT NULL DEFAULT 'chat',
        status TEXT NOT NULL DEFAULT 'queued',
        input_message TEXT NOT NULL DEFAULT '',
        resume_payload TEXT,
        checkpoint_thread TEXT NOT NULL,
        checkpoint_ns TEXT,
        latest_error TEXT,
        metrics TEXT,
        started_at TEXT,
        finished_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (status IN ('queued', 'running', 'waiting_input', 'completed', 'failed', 'cancelled'))
    )",
    "CREATE TABLE IF NOT EXISTS plans (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        goal TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY NOT NULL,
        plan_id TEXT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT,
        agent_type TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        progress INTEGER NOT NULL DEFAULT 0,
        depends_on TEXT,
        can_parallel INTEGER NOT NULL DEFAULT 1,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        result TEXT,
        started_at TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS product_docs (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL UNIQUE REFERENCES sessions(id) ON DELETE CASCADE,
        content TEXT NOT NULL DEFAULT '',
        structured TEXT NOT NULL DEFAULT '{}',
        version INTEGER NOT NULL DEFAULT 1,
        status TEXT NOT NULL DEFAULT 'draft',
        pending_regeneration_pages TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (status IN ('draft', 'confirmed', 'outdated'))
    )",
    "CREATE TABLE IF NOT EXISTS product_doc_histories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_doc_id TEXT NOT NULL REFERENCES product_docs(id) ON DELETE CASCADE,
        version INTEGER NOT NULL,
        content TEXT,
        structured TEXT,
        change_summary TEXT,
        source TEXT NOT NULL DEFAULT 'auto',
        is_pinned INTEGER NOT NULL DEFAULT 0,
        is_released INTEGER NOT NULL DEFAULT 0,
        released_at TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (product_doc_id, version),
        CHECK (source IN ('auto', 'manual', 'rollback'))
    )",
    "CREATE TABLE IF NOT EXISTS pages (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        slug TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        order_index INTEGER NOT NULL DEFAULT 0,
        current_version_id INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (session_id, slug)
    )",
    "CREATE TABLE IF NOT EXISTS page_versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
        version INTEGER NOT NULL,
        html TEXT,
        description TEXT,
        source TEXT NOT NULL DEFAULT 'auto',
        is_pinned INTEGER NOT NULL DEFAULT 0,
        is_released INTEGER NOT NULL DEFAULT 0,
        released_at TEXT,
        payload_pruned_at TEXT,
        fallback_used INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (page_id, version),
        CHECK (source IN ('auto', 'manual', 'rollback'))
    )",
    "CREATE TABLE IF NOT EXISTS project_snapshots (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        snapshot_number INTEGER NOT NULL,
        label TEXT,
        source TEXT NOT NULL DEFAULT 'auto',
        is_pinned INTEGER NOT NULL DEFAULT 0,
        is_released INTEGER NOT NULL DEFAULT 0,
        released_at TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (session_id, snapshot_number),
        CHECK (source IN ('auto', 'manual', 'rollback'))
    )",
    "CREATE TABLE IF NOT EXISTS project_snapshot_docs (
        snapshot_id TEXT PRIMARY KEY NOT NULL REFERENCES project_snapshots(id) ON DELETE CASCADE,
        content TEXT,
        structured TEXT,
        global_style TEXT,
        design_direction TEXT,
        product_doc_version INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS project_snapshot_pages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        snapshot_id TEXT NOT NULL REFERENCES project_snapshots(id) ON DELETE CASCADE,
        page_id TEXT NOT NULL,
        slug TEXT NOT NULL,
        title TEXT NOT NULL,
        order_index INTEGER NOT NULL,
        rendered_html TEXT
    )",
    "CREATE TABLE IF NOT EXISTS session_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        run_id TEXT,
        event_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        type TEXT NOT NULL,
        payload TEXT,
        source TEXT NOT NULL DEFAULT 'session',
        created_at TEXT NOT NULL,
        UNIQUE (session_id, seq),
        UNIQUE (session_id, event_id),
        CHECK (source IN ('session', 'plan', 'task'))
    )",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_runs_session ON runs (session_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_runs_session_status ON runs (session_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_plan ON tasks (plan_id)",
    "CREATE INDEX IF NOT EXISTS idx_doc_histories_doc ON product_doc_histories (product_doc_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_pages_session ON pages (session_id)",
    "CREATE INDEX IF NOT EXISTS idx_page_versions_page ON page_versions (page_id)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_session ON project_snapshots (session_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_snapshot_pages ON project_snapshot_pages (snapshot_id, page_id)",
    "CREATE INDEX IF NOT EXISTS idx_session_events_seq ON session_events (session_id, seq)",
    "CREATE INDEX IF NOT EXISTS idx_session_events_run ON session_events (session_id, run_id, seq)",
];

/// Create all tables and indexes if they do not exist
pub async fn create_schema(pool: &DatabasePool) -> Result<(), sqlx::Error> {
    for ddl in TABLES.iter().chain(INDEXES) {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> DatabasePool {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    // A single connection so every query sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_creates_all_tables() {
        let pool = test_pool().await;
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count.0, 12);
    }

    #[tokio::test]
    async fn test_session_event_seq_unique() {
        let pool = test_pool().await;
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO sessions (id, title, created_at, updated_at) VALUES ('s1', 't', ?, ?)")
            .bind(&now)
            .bind(&now)
            .execute(&pool)
            .await
            .unwrap();

        let insert = "INSERT INTO session_events (session_id, event_id, seq, type, source, created_at)
                      VALUES ('s1', ?, 1, 'run_started', 'session', ?)";
        sqlx::query(insert)
            .bind("e1")
            .bind(&now)
            .execute(&pool)
            .await
            .unwrap();
        let duplicate = sqlx::query(insert)
            .bind("e2")
            .bind(&now)
            .execute(&pool)
            .await;
        assert!(duplicate.is_err());
    }
}
