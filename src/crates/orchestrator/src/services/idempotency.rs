//! Idempotency-key cache for Create and Resume
//!
//! Process-local TTL cache keyed by `(operation, target_id, key)`, storing the
//! prior response status and body. Entries expire lazily on read; two calls
//! with the same key inside the TTL return byte-equal bodies.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Default entry lifetime: 24 hours
pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
struct CachedResponse {
    status_code: u16,
    body: String,
    expires_at: DateTime<Utc>,
}

/// Process-local idempotency cache
#[derive(Clone)]
pub struct IdempotencyCache {
    entries: Arc<DashMap<(String, String, String), CachedResponse>>,
    ttl: Duration,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::with_ttl(Duration::hours(DEFAULT_TTL_HOURS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Look up a prior response; expired entries are dropped on the way
    pub fn get(&self, operation: &str, target_id: &str, key: &str) -> Option<(u16, String)> {
        if key.is_empty() {
            return None;
        }
        let now = Utc::now();
        self.entries.retain(|_, entry| entry.expires_at > now);

        let cache_key = (
            operation.to_string(),
            target_id.to_string(),
            key.to_string(),
        );
        self.entries
            .get(&cache_key)
            .map(|entry| (entry.status_code, entry.body.clone()))
    }

    /// Record the response produced for an idempotency key
    pub fn put(&self, operation: &str, target_id: &str, key: &str, status_code: u16, body: String) {
        if key.is_empty() {
            return;
        }
        let cache_key = (
            operation.to_string(),
            target_id.to_string(),
            key.to_string(),
        );
        self.entries.insert(
            cache_key,
            CachedResponse {
                status_code,
                body,
                expires_at: Utc::now() + self.ttl,
            },
        );
    }
}
