//! Idempotency service - replay detection for money-movement operations
//!
//! A caller-supplied key plus the operation route identifies one logical
//! attempt. The first execution records its outcome; replays return that
//! outcome instead of executing again. The record write itself happens
//! inside the store transaction of the operation being protected, so the
//! business mutation and its idempotency record commit or roll back as
//! one unit.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::adapters::duckdb::{DuckDbLedgerStore, IdempotencyScope};
use crate::domain::result::Result;

/// Route name for transfers; one namespace for all transfers
pub const TRANSFER_ROUTE: &str = "transfer";

/// Route name for deposits, scoped per account so a reused key cannot
/// collide across accounts
pub fn deposit_route(account_id: Uuid) -> String {
    format!("deposit/{}", account_id)
}

/// Outcome of consulting the idempotency manager before executing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyCheck {
    /// No record for this (key, route): execute and record the outcome
    Fresh,
    /// Already executed: return the recorded outcome, skip re-execution
    Replayed(String),
}

/// Idempotency service
#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<DuckDbLedgerStore>,
    ttl_seconds: i64,
}

impl IdempotencyService {
    pub fn new(store: Arc<DuckDbLedgerStore>, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Check whether this (key, route) was already executed
    ///
    /// Expiry does not matter here: as long as the record exists it
    /// deduplicates retries. Only the sweep removes records.
    pub fn begin_or_replay(&self, key: &str, route: &str) -> Result<IdempotencyCheck> {
        match self.store.find_idempotency(key, route)? {
            Some(record) => match record.result_ref {
                Some(result_ref) => {
                    self.store.touch_idempotency(key, route)?;
                    Ok(IdempotencyCheck::Replayed(result_ref))
                }
                None => Ok(IdempotencyCheck::Fresh),
            },
            None => Ok(IdempotencyCheck::Fresh),
        }
    }

    /// Build the scope a store operation records on a fresh execution
    pub fn scope(
        &self,
        key: &str,
        route: impl Into<String>,
        user_id: Option<Uuid>,
    ) -> IdempotencyScope {
        IdempotencyScope {
            key: key.to_string(),
            route: route.into(),
            user_id,
            ttl_seconds: self.ttl_seconds,
        }
    }

    /// Delete records past their expiry; returns how many were removed
    pub fn sweep_expired(&self) -> Result<usize> {
        self.store.sweep_idempotency(Utc::now())
    }
}
