//! Postgres-backed checkpoint storage
//!
//! Same table shape as the SQLite backend, on a `PgPool`. Intended for
//! deployments where checkpoints must be shared or survive individual hosts.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::{CheckpointError, Result};
use crate::serializer::{JsonSerializer, SerializerProtocol};
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::sync::Arc;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    seq BIGSERIAL PRIMARY KEY,
    thread_id TEXT NOT NULL,
    checkpoint_id TEXT NOT NULL,
    checkpoint_ns TEXT,
    parent_checkpoint_id TEXT,
    state BYTEA NOT NULL,
    metadata BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (thread_id, checkpoint_id)
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_checkpoints_thread ON checkpoints (thread_id, seq)";

/// Checkpoint saver backed by a Postgres database
#[derive(Clone)]
pub struct PostgresCheckpointSaver {
    pool: PgPool,
    serializer: Arc<dyn SerializerProtocol>,
}

impl PostgresCheckpointSaver {
    /// Connect to the given Postgres URL and ensure the checkpoint table exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Build a saver over an existing pool
    pub async fn with_pool(pool: PgPool) -> Result<Self> {
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

    fn row_to_tuple(&self, row: &sqlx::postgres::PgRow) -> Result<CheckpointTuple> {
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
impl CheckpointSaver for PostgresCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;

        let row = match &config.checkpoint_id {
            Some(checkpoint_id) => {
                sqlx::query(
                    "SELECT thread_id, checkpoint_ns, parent_checkpoint_id, state, metadata
                     FROM checkpoints WHERE thread_id = $1 AND checkpoint_id = $2",
                )
                .bind(thread_id)
                .bind(checkpoint_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT thread_id, checkpoint_ns, parent_checkpoint_id, state, metadata
                     FROM checkpoints WHERE thread_id = $1 ORDER BY seq DESC LIMIT 1",
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
             FROM checkpoints WHERE thread_id = $1 ORDER BY seq DESC LIMIT $2",
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
            "SELECT checkpoint_id FROM checkpoints WHERE thread_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(&thread_id)
        .fetch_optional(&self.pool)
        .await?;

        let state_bytes = self.serializer.dumps(&checkpoint)?;
        let metadata_bytes = self.serializer.dumps(&metadata)?;

        sqlx::query(
            "INSERT INTO checkpoints
                 (thread_id, checkpoint_id, checkpoint_ns, parent_checkpoint_id, state, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&thread_id)
        .bind(&checkpoint.id)
        .bind(&config.checkpoint_ns)
        .bind(&parent_id)
        .bind(&state_bytes)
        .bind(&metadata_bytes)
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
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
