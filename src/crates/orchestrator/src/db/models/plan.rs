//! Plan and task models: planner output driven by the parallel executor

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Plan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Aborted,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::InProgress => "in_progress",
            PlanStatus::Done => "done",
            PlanStatus::Failed => "failed",
            PlanStatus::Aborted => "aborted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PlanStatus::Pending),
            "in_progress" => Some(PlanStatus::InProgress),
            "done" => Some(PlanStatus::Done),
            "failed" => Some(PlanStatus::Failed),
            "aborted" => Some(PlanStatus::Aborted),
            _ => None,
        }
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Blocked,
    Skipped,
    Retrying,
    Aborted,
    Timeout,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Timeout => "timeout",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            "blocked" => Some(TaskStatus::Blocked),
            "skipped" => Some(TaskStatus::Skipped),
            "retrying" => Some(TaskStatus::Retrying),
            "aborted" => Some(TaskStatus::Aborted),
            "timeout" => Some(TaskStatus::Timeout),
            _ => None,
        }
    }

    /// Satisfies a dependency edge
    pub fn is_satisfied(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Skipped)
    }

    /// No further work will happen for this task
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done
                | TaskStatus::Failed
                | TaskStatus::Skipped
                | TaskStatus::Aborted
                | TaskStatus::Timeout
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plan groups the tasks produced for one goal
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: String,
    pub session_id: String,
    pub goal: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Plan {
    pub fn plan_status(&self) -> PlanStatus {
        PlanStatus::parse(&self.status).unwrap_or(PlanStatus::Pending)
    }
}

/// One unit of planner work
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: String,
    pub plan_id: String,
    pub title: String,
    pub description: Option<String>,

    /// Executor strategy key: interview, generation, refinement, validator, export
    pub agent_type: Option<String>,

    pub status: String,

    /// 0-100
    pub progress: i64,

    /// JSON array of task ids this task depends on
    pub depends_on: Option<String>,

    /// Whether the task may share the pool with others
    pub can_parallel: bool,

    pub retry_count: i64,
    pub error_message: Option<String>,

    /// Executor result as JSON text
    pub result: Option<String>,

    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
}

impl Task {
    pub fn task_status(&self) -> TaskStatus {
        TaskStatus::parse(&self.status).unwrap_or(TaskStatus::Pending)
    }

    /// Parse the `depends_on` JSON column into task ids
    pub fn dependency_ids(&self) -> Vec<String> {
        parse_depends_on(self.depends_on.as_deref())
    }
}

/// Parse a `depends_on` column value: a JSON array, or a bare id
pub fn parse_depends_on(value: Option<&str>) -> Vec<String> {
    let Some(raw) = value else {
        return Vec::new();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(id) => Some(id),
                other => Some(other.to_string()),
            })
            .collect(),
        _ => vec![trimmed.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_depends_on_variants() {
        assert!(parse_depends_on(None).is_empty());
        assert!(parse_depends_on(Some("")).is_empty());
        assert_eq!(parse_depends_on(Some("t1")), vec!["t1"]);
        assert_eq!(
            parse_depends_on(Some(r#"["t1", "t2"]"#)),
            vec!["t1", "t2"]
        );
    }

    #[test]
    fn test_status_satisfaction() {
        assert!(TaskStatus::Done.is_satisfied());
        assert!(TaskStatus::Skipped.is_satisfied());
        assert!(!TaskStatus::Failed.is_satisfied());
        assert!(TaskStatus::Timeout.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }
}
