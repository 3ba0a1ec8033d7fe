//! Doctor service - ledger integrity checks

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbLedgerStore;

/// Doctor service for integrity checks
pub struct DoctorService {
    store: Arc<DuckDbLedgerStore>,
}

impl DoctorService {
    pub fn new(store: Arc<DuckDbLedgerStore>) -> Self {
        Self { store }
    }

    /// Run all integrity checks
    ///
    /// Balance drift and unpaired transfer legs are errors: they mean the
    /// ledger's core invariants do not hold. Sweepable idempotency
    /// records are only a warning (the sweep simply has not run yet).
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = HashMap::new();

        // Cached balance vs recomputation from posted entries
        let drifting = self.store.check_balance_drift()?;
        let drift_details: Vec<serde_json::Value> = drifting
            .iter()
            .map(|s| {
                // Parse "account_id|cached|recomputed" format
                let parts: Vec<&str> = s.split('|').collect();
                if parts.len() >= 3 {
                    json!({
                        "account_id": parts[0],
                        "cached_balance": parts[1].parse::<i64>().ok(),
                        "recomputed_balance": parts[2].parse::<i64>().ok(),
                    })
                } else {
                    json!({ "info": s })
                }
            })
            .collect();
        checks.insert(
            "balance_drift".to_string(),
            CheckResult {
                status: if drifting.is_empty() { "pass" } else { "error" }.to_string(),
                message: if drifting.is_empty() {
                    "All cached balances match the entry history".to_string()
                } else {
                    format!("{} account(s) disagree with their entry history", drifting.len())
                },
                details: if drifting.is_empty() {
                    None
                } else {
                    Some(drift_details)
                },
            },
        );

        // Every transfer group must have exactly one out and one in leg
        // with equal amount and currency
        let unpaired = self.store.check_unpaired_transfers()?;
        let unpaired_details: Vec<serde_json::Value> = unpaired
            .iter()
            .map(|g| json!({ "transfer_group_id": g }))
            .collect();
        checks.insert(
            "unpaired_transfers".to_string(),
            CheckResult {
                status: if unpaired.is_empty() { "pass" } else { "error" }.to_string(),
                message: if unpaired.is_empty() {
                    "All transfer legs pair up".to_string()
                } else {
                    format!("{} transfer group(s) have mismatched legs", unpaired.len())
                },
                details: if unpaired.is_empty() {
                    None
                } else {
                    Some(unpaired_details)
                },
            },
        );

        // Entries referencing missing accounts
        let orphaned = self.store.check_orphaned_entries()?;
        let orphan_details: Vec<serde_json::Value> =
            orphaned.iter().map(|e| json!({ "entry_id": e })).collect();
        checks.insert(
            "orphaned_entries".to_string(),
            CheckResult {
                status: if orphaned.is_empty() { "pass" } else { "error" }.to_string(),
                message: if orphaned.is_empty() {
                    "No orphaned entries found".to_string()
                } else {
                    format!("{} entr(ies) reference missing accounts", orphaned.len())
                },
                details: if orphaned.is_empty() {
                    None
                } else {
                    Some(orphan_details)
                },
            },
        );

        // Idempotency records past their expiry
        let sweepable = self.store.count_sweepable_idempotency(Utc::now())?;
        checks.insert(
            "expired_idempotency".to_string(),
            CheckResult {
                status: if sweepable == 0 { "pass" } else { "warning" }.to_string(),
                message: if sweepable == 0 {
                    "No expired idempotency records".to_string()
                } else {
                    format!("{} idempotency record(s) are eligible for sweeping", sweepable)
                },
                details: None,
            },
        );

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: HashMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
