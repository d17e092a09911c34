//! Planner-task execution
//!
//! The [`TaskScheduler`] orders a plan's task DAG (topological readiness,
//! cycle detection, serial-task exclusivity); the [`ParallelExecutor`] drives
//! it with a bounded pool, per-task timeouts and retries, cooperative abort,
//! and a periodic sweep for stuck tasks. Task bodies are pluggable
//! [`TaskExecutor`] strategies resolved by agent type.

pub mod parallel;
pub mod retry;
pub mod scheduler;
pub mod task_executor;

pub use parallel::{ParallelExecutor, ParallelExecutorConfig};
pub use retry::{is_temporary_error, TaskRetryPolicy};
pub use scheduler::TaskScheduler;
pub use task_executor::{
    AgentBackend, ChatTurn, ExecutionContext, GeneratedPage, TaskExecutor, TaskExecutorFactory,
};
