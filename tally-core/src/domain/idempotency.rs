//! Idempotency record domain model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maps a caller-supplied (key, route) pair to the outcome of the first
/// execution
///
/// The pair is unique: a replay with the same key and route returns the
/// recorded `result_ref` (a transfer-group id or entry id) instead of
/// executing again. Records expire after a conservative TTL and are
/// deleted by a sweep, never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub key: String,
    pub route: String,
    /// Weak reference to the caller, kept for auditing only
    pub user_id: Option<Uuid>,
    /// Outcome of the first execution (transfer-group id or entry id)
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// None means the record never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    /// Create a new record for a freshly executed operation
    ///
    /// `ttl_seconds` of zero or less means no expiry.
    pub fn new(
        key: impl Into<String>,
        route: impl Into<String>,
        user_id: Option<Uuid>,
        result_ref: impl Into<String>,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        let expires_at = if ttl_seconds > 0 {
            Some(now + Duration::seconds(ttl_seconds))
        } else {
            None
        };
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            route: route.into(),
            user_id,
            result_ref: Some(result_ref.into()),
            created_at: now,
            last_seen_at: now,
            expires_at,
        }
    }

    /// True once the record is past its expiry and eligible for sweeping
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < now,
            None => false,
        }
    }
}
