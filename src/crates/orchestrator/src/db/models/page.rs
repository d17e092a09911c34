//! Page and page-version models

use crate::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum slug length
pub const MAX_SLUG_LEN: usize = 40;

/// Validate a page slug: `[a-z0-9-]+`, at most 40 characters
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(OrchestratorError::Validation("slug is required".to_string()));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(OrchestratorError::Validation(format!(
            "slug must be {MAX_SLUG_LEN} characters or fewer"
        )));
    }
    if !slug
        .bytes()
        .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-')
    {
        return Err(OrchestratorError::Validation(
            "slug must match pattern [a-z0-9-]+".to_string(),
        ));
    }
    Ok(())
}

/// A generated page; unique per session by slug
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Page {
    pub id: String,
    pub session_id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub order_index: i64,

    /// Weak reference to the live version; resolved at read time
    pub current_version_id: Option<i64>,

    pub created_at: String,
    pub updated_at: String,
}

/// One immutable rendering of a page
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PageVersion {
    pub id: i64,
    pub page_id: String,
    pub version: i64,

    /// Nulled once the row is released by retention
    pub html: Option<String>,

    pub description: Option<String>,
    pub source: String,
    pub is_pinned: bool,
    pub is_released: bool,
    pub released_at: Option<String>,
    pub payload_pruned_at: Option<String>,

    /// Whether a fallback rendering was substituted for this version
    pub fallback_used: bool,

    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slugs() {
        for slug in ["home", "about-us", "page-2", "a"] {
            assert!(validate_slug(slug).is_ok(), "slug '{slug}' should be valid");
        }
    }

    #[test]
    fn test_invalid_slugs() {
        for slug in ["", "Home", "about us", "café", "page_2"] {
            assert!(validate_slug(slug).is_err(), "slug '{slug}' should be invalid");
        }
        let too_long = "a".repeat(41);
        assert!(validate_slug(&too_long).is_err());
    }
}
