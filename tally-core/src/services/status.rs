//! Status service - service health summary

use std::sync::Arc;

use serde::Serialize;

use crate::adapters::duckdb::DuckDbLedgerStore;
use crate::config::Config;
use crate::domain::result::Result;

/// Snapshot of stored entities and effective settings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub users: i64,
    pub accounts: i64,
    pub ledger_entries: i64,
    pub idempotency_records: i64,
    pub currency: String,
    pub max_transaction_minor: i64,
    pub simulate_deposits: bool,
}

/// Status service
pub struct StatusService {
    store: Arc<DuckDbLedgerStore>,
    currency: String,
    max_transaction_minor: i64,
    simulate_deposits: bool,
}

impl StatusService {
    pub fn new(store: Arc<DuckDbLedgerStore>, config: &Config) -> Self {
        Self {
            store,
            currency: config.currency.clone(),
            max_transaction_minor: config.max_transaction_minor,
            simulate_deposits: config.simulate_deposits,
        }
    }

    /// Gather the status summary
    pub fn summary(&self) -> Result<StatusSummary> {
        Ok(StatusSummary {
            users: self.store.count_users()?,
            accounts: self.store.count_accounts()?,
            ledger_entries: self.store.count_entries()?,
            idempotency_records: self.store.count_idempotency_records()?,
            currency: self.currency.clone(),
            max_transaction_minor: self.max_transaction_minor,
            simulate_deposits: self.simulate_deposits,
        })
    }
}
