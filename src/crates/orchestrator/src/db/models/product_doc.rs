//! Product doc and history models: the source-of-truth spec for a session

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Product doc lifecycle status
///
/// Valid transitions: draft -> confirmed, confirmed -> outdated,
/// outdated -> confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductDocStatus {
    Draft,
    Confirmed,
    Outdated,
}

impl ProductDocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductDocStatus::Draft => "draft",
            ProductDocStatus::Confirmed => "confirmed",
            ProductDocStatus::Outdated => "outdated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(ProductDocStatus::Draft),
            "confirmed" => Some(ProductDocStatus::Confirmed),
            "outdated" => Some(ProductDocStatus::Outdated),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: ProductDocStatus) -> bool {
        use ProductDocStatus::*;
        matches!((self, next), (Draft, Confirmed) | (Confirmed, Outdated) | (Outdated, Confirmed))
    }
}

/// How a versioned row (history, page version, snapshot) was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    Auto,
    Manual,
    Rollback,
}

impl VersionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionSource::Auto => "auto",
            VersionSource::Manual => "manual",
            VersionSource::Rollback => "rollback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(VersionSource::Auto),
            "manual" => Some(VersionSource::Manual),
            "rollback" => Some(VersionSource::Rollback),
            _ => None,
        }
    }
}

/// The authoritative structured + markdown description of what to build
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductDoc {
    pub id: String,
    pub session_id: String,

    /// Markdown body
    pub content: String,

    /// Structured payload as JSON text
    pub structured: String,

    /// Monotonic version, bumped on every content/structured change
    pub version: i64,

    pub status: String,

    /// JSON array of page slugs awaiting regeneration
    pub pending_regeneration_pages: String,

    pub created_at: String,
    pub updated_at: String,
}

impl ProductDoc {
    pub fn doc_status(&self) -> ProductDocStatus {
        ProductDocStatus::parse(&self.status).unwrap_or(ProductDocStatus::Draft)
    }

    /// Parsed structured payload; empty object when unparsable
    pub fn structured_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.structured).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// An immutable version of the product doc
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductDocHistory {
    pub id: i64,
    pub product_doc_id: String,
    pub version: i64,

    /// Nulled once the row is released by retention
    pub content: Option<String>,
    pub structured: Option<String>,

    pub change_summary: Option<String>,
    pub source: String,
    pub is_pinned: bool,
    pub is_released: bool,
    pub released_at: Option<String>,
    pub created_at: String,
}

impl ProductDocHistory {
    pub fn version_source(&self) -> VersionSource {
        VersionSource::parse(&self.source).unwrap_or(VersionSource::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_status_transitions() {
        assert!(ProductDocStatus::Draft.can_transition_to(ProductDocStatus::Confirmed));
        assert!(ProductDocStatus::Confirmed.can_transition_to(ProductDocStatus::Outdated));
        assert!(ProductDocStatus::Outdated.can_transition_to(ProductDocStatus::Confirmed));
        assert!(!ProductDocStatus::Draft.can_transition_to(ProductDocStatus::Outdated));
        assert!(!ProductDocStatus::Confirmed.can_transition_to(ProductDocStatus::Draft));
    }

    #[test]
    fn test_version_source_parse() {
        assert_eq!(VersionSource::parse("rollback"), Some(VersionSource::Rollback));
        assert_eq!(VersionSource::parse("fabricated"), None);
    }
}
