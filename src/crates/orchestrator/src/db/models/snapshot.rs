//! Project snapshot models: value-copied captures of doc + rendered pages

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Atomic snapshot of the product doc and every page at one instant
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectSnapshot {
    pub id: String,
    pub session_id: String,

    /// Unique per session, assigned monotonically
    pub snapshot_number: i64,

    pub label: Option<String>,
    pub source: String,
    pub is_pinned: bool,
    pub is_released: bool,
    pub released_at: Option<String>,
    pub created_at: String,
}

/// The captured product doc payload (a value copy, not a reference)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotDoc {
    pub snapshot_id: String,
    pub content: Option<String>,
    pub structured: Option<String>,
    pub global_style: Option<String>,
    pub design_direction: Option<String>,
    pub product_doc_version: Option<i64>,
}

/// One captured page with its rendered HTML
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotPage {
    pub id: i64,
    pub snapshot_id: String,
    pub page_id: String,
    pub slug: String,
    pub title: String,
    pub order_index: i64,
    pub rendered_html: Option<String>,
}
