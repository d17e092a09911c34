//! In-memory checkpoint storage for development and testing
//!
//! Stores all checkpoints in a thread-safe map keyed by thread id. Data is
//! lost on process restart; use the SQLite or Postgres backend when resumes
//! must survive the process.

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::Result;
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    config: CheckpointConfig,
    parent_config: Option<CheckpointConfig>,
}

type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<CheckpointEntry>>>>;

/// In-memory checkpoint saver implementation
///
/// # Example
///
/// ```rust,ignore
/// let saver = InMemoryCheckpointSaver::new();
/// let compiled = graph.compile()?.with_checkpointer(Arc::new(saver));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of threads currently tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for test isolation)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;
        let storage = self.storage.read().await;

        let Some(entries) = storage.get(thread_id) else {
            return Ok(None);
        };

        let entry = match &config.checkpoint_id {
            Some(checkpoint_id) => entries.iter().find(|e| &e.checkpoint.id == checkpoint_id),
            None => entries.last(),
        };

        Ok(entry.map(|entry| CheckpointTuple {
            config: entry.config.clone(),
            checkpoint: entry.checkpoint.clone(),
            metadata: entry.metadata.clone(),
            parent_config: entry.parent_config.clone(),
        }))
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;
        let storage = self.storage.read().await;

        let mut results = Vec::new();
        if let Some(entries) = storage.get(thread_id) {
            for entry in entries.iter().rev() {
                results.push(CheckpointTuple {
                    config: entry.config.clone(),
                    checkpoint: entry.checkpoint.clone(),
                    metadata: entry.metadata.clone(),
                    parent_config: entry.parent_config.clone(),
                });
                if let Some(limit) = limit {
                    if results.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let thread_id = config.require_thread_id()?.to_string();
        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id.clone()).or_default();

        let stored_config = CheckpointConfig {
            thread_id: Some(thread_id.clone()),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint.id.clone()),
        };
        let parent_config = entries.last().map(|previous| previous.config.clone());

        entries.push(CheckpointEntry {
            checkpoint,
            metadata,
            config: stored_config.clone(),
            parent_config,
        });

        Ok(stored_config)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;
    use serde_json::json;

    fn config_for(thread: &str) -> CheckpointConfig {
        CheckpointConfig::new().with_thread_id(thread)
    }

    #[tokio::test]
    async fn test_put_and_get_latest() {
        let saver = InMemoryCheckpointSaver::new();
        let config = config_for("thread-1");

        saver
            .put(
                &config,
                Checkpoint::new(json!({"step": 1})),
                CheckpointMetadata::new(0, CheckpointSource::Loop, Some("brief".into())),
            )
            .await
            .unwrap();
        saver
            .put(
                &config,
                Checkpoint::new(json!({"step": 2})),
                CheckpointMetadata::new(1, CheckpointSource::Loop, Some("generate".into())),
            )
            .await
            .unwrap();

        let tuple = saver.get_tuple(&config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.state["step"], 2);
        assert_eq!(tuple.metadata.next_node.as_deref(), Some("generate"));
        assert!(tuple.parent_config.is_some());
    }

    #[tokio::test]
    async fn test_get_specific_checkpoint() {
        let saver = InMemoryCheckpointSaver::new();
        let config = config_for("thread-1");

        let stored = saver
            .put(
                &config,
                Checkpoint::new(json!({"step": 1})),
                CheckpointMetadata::new(0, CheckpointSource::Loop, None),
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

        let tuple = saver.get_tuple(&stored).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.state["step"], 1);
    }

    #[tokio::test]
    async fn test_thread_isolation() {
        let saver = InMemoryCheckpointSaver::new();

        saver
            .put(
                &config_for("thread-a"),
                Checkpoint::new(json!({"owner": "a"})),
                CheckpointMetadata::new(0, CheckpointSource::Input, None),
            )
            .await
            .unwrap();

        assert!(saver
            .get_tuple(&config_for("thread-b"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(saver.thread_count().await, 1);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let saver = InMemoryCheckpointSaver::new();
        let config = config_for("thread-1");

        for step in 0..4 {
            saver
                .put(
                    &config,
                    Checkpoint::new(json!({"step": step})),
                    CheckpointMetadata::new(step, CheckpointSource::Loop, None),
                )
                .await
                .unwrap();
        }

        let listed = saver.list(&config, Some(2)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].checkpoint.state["step"], 3);
        assert_eq!(listed[1].checkpoint.state["step"], 2);
    }

    #[tokio::test]
    async fn test_delete_thread() {
        let saver = InMemoryCheckpointSaver::new();
        let config = config_for("thread-1");

        saver
            .put(
                &config,
                Checkpoint::new(json!({})),
                CheckpointMetadata::new(0, CheckpointSource::Input, None),
            )
            .await
            .unwrap();
        saver.delete_thread("thread-1").await.unwrap();

        assert!(saver.get_tuple(&config).await.unwrap().is_none());
        assert_eq!(saver.checkpoint_count().await, 0);
    }
}
