//! Checkpointer factory
//!
//! Resolves the configured backend: in-memory, SQLite, Postgres, or none.
//! The checkpoint URL defaults to the core database URL and can be overridden
//! with `FLOWGRAPH_CHECKPOINT_URL`.

use crate::config::{CheckpointerMode, Settings};
use crate::Result;
use flowgraph_checkpoint::{
    CheckpointSaver, InMemoryCheckpointSaver, PostgresCheckpointSaver, SqliteCheckpointSaver,
};
use std::sync::Arc;

/// Build the configured checkpointer; `None` disables checkpointing (and with
/// it resume support)
pub async fn build_checkpointer(settings: &Settings) -> Result<Option<Arc<dyn CheckpointSaver>>> {
    match settings.checkpointer_mode {
        CheckpointerMode::Off => Ok(None),
        CheckpointerMode::Memory => Ok(Some(Arc::new(InMemoryCheckpointSaver::new()))),
        CheckpointerMode::Sqlite => {
            let url = settings.resolved_checkpoint_url();
            let saver = SqliteCheckpointSaver::connect(url)
                .await
                .map_err(flowgraph_core::GraphError::Checkpoint)?;
            Ok(Some(Arc::new(saver)))
        }
        CheckpointerMode::Postgres => {
            let url = settings.resolved_checkpoint_url();
            let saver = PostgresCheckpointSaver::connect(url)
                .await
                .map_err(flowgraph_core::GraphError::Checkpoint)?;
            Ok(Some(Arc::new(saver)))
        }
    }
}
