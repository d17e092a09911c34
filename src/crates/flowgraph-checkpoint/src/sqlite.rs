//! SQLite-backed checkpoint storage
//!
//! Persists checkpoints to a `checkpoints` table so interrupted threads can be
//! resumed after a process restart. The table is created on construction.
//! Payloads are serialized with the configured [`SerializerProtocol`]
//! (JSON by default).

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::{CheckpointError, Result};
use crate::serializer::{JsonSerializer, SerializerProtocol};
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::sync::Arc;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL,
    checkpoint_id TEXT NOT NULL,
    checkpoint_ns TEXT,
    parent_checkpoint_id TEXT,
    state BLOB NOT NULL,
    metadata BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (thread_id, checkpoint_id)
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_checkpoints_thread ON checkpoints (thread_id, seq)";

/// Checkpoint saver backed by a SQLite database
#[derive(Clone)]
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
    serializer: Arc<dyn SerializerProtocol>,
}

impl SqliteCheckpointSaver {
    /// Connect to the given SQLite URL and ensure the checkpoint table exists
    ///
    /// # Arguments
    /// * `database_url` - SQLite connection string (e.g. "sqlite:checkpoints.db")
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Build a saver over an existing pool
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_INDEX).execute(&pool).await?;
        Ok(Self {
            pool,
            serializer: Arc::new(JsonSerializer::new()),
        })
    }

    /// Replace the payload serializer
    pub fn with_serializer(mut self, serializer: Arc<dyn SerializerProtocol>) -> Self {
        self.serializer = serializer;
        self
    }

    fn row_to_tuple(&self, row: &sqlx::sqlite::SqliteRow) -> Result<CheckpointTuple> {
        let thread_id: String = row.get("thread_id");
        let checkpoint_ns: Option<String> = row.get("checkpoint_ns");
        let state_bytes: Vec<u8> = row.get("state");
        let metadata_bytes: Vec<u8> = row.get("metadata");
        let parent_checkpoint_id: Option<String> = row.get("parent_checkpoint_id");

        let checkpoint: Checkpoint = self.serializer.loads(&state_bytes)?;
        let metadata: CheckpointMetadata = self.serializer.loads(&metadata_bytes)?;

        let config = CheckpointConfig {
            thread_id: Some(thread_id.clone()),
            checkpoint_ns: checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint.id.clone()),
        };
        let parent_config = parent_checkpoint_id.map(|id| CheckpointConfig {
            thread_id: Some(thread_id),
            checkpoint_ns,
            checkpoint_id: Some(id),
        });

        Ok(CheckpointTuple {
            config,
            checkpoint,
            metadata,
            parent_config,
        })
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;

        let row = match &config.checkpoint_id {
            Some(checkpoint_id) => {
                sqlx::query(
                    "SELECT thread_id, checkpoint_ns, parent_checkpoint_id, state, metadata
                     FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?",
                )
                .bind(thread_id)
                .bind(checkpoint_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT thread_id, checkpoint_ns, parent_checkpoint_id, state, metadata
                     FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC LIMIT 1",
                )
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match row {
            Some(row) => Ok(Some(self.row_to_tuple(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;
        let limit = limit.unwrap_or(100) as i64;

        let rows = sqlx::query(
            "SELECT thread_id, checkpoint_ns, parent_checkpoint_id, state, metadata
             FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(thread_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| self.row_to_tuple(row)).collect()
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let thread_id = config.require_thread_id()?.to_string();

        let parent_id: Option<String> = sqlx::query_scalar(
            "SELECT checkpoint_id FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(&thread_id)
        .fetch_optional(&self.pool)
        .await?;

        let state_bytes = self.serializer.dumps(&checkpoint)?;
        let metadata_bytes = self.serializer.dumps(&metadata)?;

        sqlx::query(
            "INSERT INTO checkpoints
                 (thread_id, checkpoint_id, checkpoint_ns, parent_checkpoint_id, state, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thread_id)
        .bind(&checkpoint.id)
        .bind(&config.checkpoint_ns)
        .bind(&parent_id)
        .bind(&state_bytes)
        .bind(&metadata_bytes)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        Ok(CheckpointConfig {
            thread_id: Some(thread_id),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint.id),
        })
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;
    use serde_json::json;

    async fn saver() -> SqliteCheckpointSaver {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteCheckpointSaver::with_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let saver = saver().await;
        let config = CheckpointConfig::new().with_thread_id("t1");

        saver
            .put(
                &config,
                Checkpoint::new(json!({"pages": ["home"]})),
                CheckpointMetadata::new(0, CheckpointSource::Loop, Some("generate".into())),
            )
            .await
            .unwrap();

        let tuple = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.state["pages"][0], "home");
        assert_eq!(tuple.metadata.next_node.as_deref(), Some("generate"));
    }

    #[tokio::test]
    async fn test_latest_wins_and_parent_chain() {
        let saver = saver().await;
        let config = CheckpointConfig::new().with_thread_id("t1");

        let first = saver
            .put(
                &config,
                Checkpoint::new(json!({"step": 1})),
                CheckpointMetadata::new(0, CheckpointSource::Input, None),
            )
            .await
            .unwrap();
        saver
            .put(
                &config,
                Checkpoint::new(json!({"step": 2})),
                CheckpointMetadata::new(1, CheckpointSource::Loop, None),
            )
            .await
            .unwrap();

        let latest = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(latest.checkpoint.state["step"], 2);
        assert_eq!(
            latest.parent_config.unwrap().checkpoint_id,
            first.checkpoint_id
        );
    }

    #[tokio::test]
    async fn test_delete_thread_removes_history() {
        let saver = saver().await;
        let config = CheckpointConfig::new().with_thread_id("t1");

        saver
            .put(
                &config,
                Checkpoint::new(json!({})),
                CheckpointMetadata::new(0, CheckpointSource::Input, None),
            )
            .await
            .unwrap();
        saver.delete_thread("t1").await.unwrap();

        assert!(saver.get_tuple(&config).await.unwrap().is_none());
    }
}
