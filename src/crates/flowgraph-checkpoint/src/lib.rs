//! Checkpoint persistence for FlowGraph executions
//!
//! This crate defines the checkpoint data model and the [`CheckpointSaver`]
//! trait used by the graph runtime to persist state after every superstep,
//! plus three concrete backends:
//!
//! - [`InMemoryCheckpointSaver`] - ephemeral, for development and tests
//! - [`SqliteCheckpointSaver`] - durable single-host storage
//! - [`PostgresCheckpointSaver`] - durable shared storage
//!
//! A checkpoint records the full state map and the next node to execute, so a
//! thread parked on an interrupt can be resumed later - in the same process or
//! after a restart - by loading its latest checkpoint.

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod serializer;
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource, CheckpointTuple,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use postgres::PostgresCheckpointSaver;
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use sqlite::SqliteCheckpointSaver;
pub use traits::CheckpointSaver;
