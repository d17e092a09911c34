//! Session model: the long-lived project container

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Build pipeline status recorded on the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(BuildStatus::Pending),
            "running" => Some(BuildStatus::Running),
            "success" => Some(BuildStatus::Success),
            "failed" => Some(BuildStatus::Failed),
            _ => None,
        }
    }
}

/// A session owns one product doc, its pages, snapshots, runs, and events
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Unique session identifier (UUID string)
    pub id: String,

    /// Display title
    pub title: String,

    /// Routing metadata filled in by classification
    pub product_type: Option<String>,
    pub complexity: Option<String>,
    pub skill_id: Option<String>,
    pub doc_tier: Option<String>,

    /// Latest graph state as JSON text
    pub graph_state: Option<String>,

    /// Build status: pending, running, success, failed
    pub build_status: String,

    /// Build artifacts summary as JSON text
    pub build_artifacts: Option<String>,

    /// Aesthetic scores as JSON text
    pub aesthetic_scores: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    /// Create a new session with default metadata
    pub fn new(id: String, title: String) -> Self {
        let now = super::now_rfc3339();
        Self {
            id,
            title,
            product_type: None,
            complexity: None,
            skill_id: None,
            doc_tier: None,
            graph_state: None,
            build_status: BuildStatus::Pending.as_str().to_string(),
            build_artifacts: None,
            aesthetic_scores: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
