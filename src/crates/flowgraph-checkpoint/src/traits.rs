//! The [`CheckpointSaver`] trait - the abstraction implemented by every
//! checkpoint storage backend
//!
//! The graph executor calls `put` after each superstep and `get_tuple` when a
//! thread is resumed. Backends must be `Send + Sync` and must isolate
//! checkpoint histories per `thread_id`; beyond that they are free to store
//! data however they like (in memory, SQLite, Postgres, ...).

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::Result;
use async_trait::async_trait;

/// Core trait for implementing checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch just the checkpoint for the given configuration
    ///
    /// Convenience wrapper over [`get_tuple`](Self::get_tuple).
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Retrieve a checkpoint tuple
    ///
    /// When `config.checkpoint_id` is set, returns that exact checkpoint;
    /// otherwise returns the latest checkpoint for `config.thread_id`.
    /// Returns `Ok(None)` (not an error) when nothing matches.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List checkpoints for a thread, newest first
    async fn list(&self, config: &CheckpointConfig, limit: Option<usize>)
        -> Result<Vec<CheckpointTuple>>;

    /// Store a checkpoint, returning the config of the stored row
    ///
    /// The returned config carries the real `checkpoint_id` so callers can
    /// chain `parent_config` references.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Delete all checkpoints for a thread
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}
