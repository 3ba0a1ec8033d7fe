//! Idempotency behavior tests
//!
//! Replays with the same key must return the original outcome and leave
//! exactly one set of ledger entries behind, whatever the caller's
//! timing looks like.

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use tally_core::adapters::duckdb::DuckDbLedgerStore;
use tally_core::config::Config;
use tally_core::services::{
    AccountService, DepositService, FundingSource, IdempotencyService, TransferService,
};
use tally_core::TallyContext;

fn new_context() -> (TempDir, TallyContext) {
    let dir = TempDir::new().unwrap();
    let context = TallyContext::new(dir.path()).unwrap();
    (dir, context)
}

fn funded_accounts(context: &TallyContext, amount_minor: i64) -> (uuid::Uuid, uuid::Uuid) {
    let a = context
        .account_service
        .open_account("ada@example.com", None)
        .unwrap();
    let b = context
        .account_service
        .open_account("bob@example.com", None)
        .unwrap();
    if amount_minor > 0 {
        context
            .deposit_service
            .deposit(a.account_id, amount_minor, "USD", FundingSource::Simulated, None)
            .unwrap();
    }
    (a.account_id, b.account_id)
}

#[test]
fn test_transfer_replay_returns_identical_outcome() {
    let (_dir, context) = new_context();
    let (a, b) = funded_accounts(&context, 10_000);

    let first = context
        .transfer_service
        .transfer(a, b, 2_500, "USD", Some("tx-attempt-1"))
        .unwrap();
    let second = context
        .transfer_service
        .transfer(a, b, 2_500, "USD", Some("tx-attempt-1"))
        .unwrap();

    assert_eq!(first.transfer_group_id, second.transfer_group_id);
    assert_eq!(first.from_balance_minor, second.from_balance_minor);
    assert_eq!(first.to_balance_minor, second.to_balance_minor);

    // Exactly one pair of legs was written
    let summary = context.status_service.summary().unwrap();
    assert_eq!(summary.ledger_entries, 3); // deposit + two transfer legs
    assert_eq!(
        context.account_service.get_account(a).unwrap().balance_minor,
        7_500
    );
    assert_eq!(
        context.account_service.get_account(b).unwrap().balance_minor,
        2_500
    );
}

#[test]
fn test_deposit_replay_returns_identical_outcome() {
    let (_dir, context) = new_context();
    let (a, _) = funded_accounts(&context, 0);

    let first = context
        .deposit_service
        .deposit(a, 10_000, "USD", FundingSource::Simulated, Some("dep-attempt-1"))
        .unwrap();
    let second = context
        .deposit_service
        .deposit(a, 10_000, "USD", FundingSource::Simulated, Some("dep-attempt-1"))
        .unwrap();

    assert_eq!(first.entry_id, second.entry_id);
    assert_eq!(first.new_balance_minor, 10_000);
    assert_eq!(second.new_balance_minor, 10_000);

    let summary = context.status_service.summary().unwrap();
    assert_eq!(summary.ledger_entries, 1);
    assert_eq!(summary.idempotency_records, 1);
}

#[test]
fn test_replay_reports_current_balances_not_a_snapshot() {
    let (_dir, context) = new_context();
    let (a, b) = funded_accounts(&context, 10_000);

    let first = context
        .transfer_service
        .transfer(a, b, 2_500, "USD", Some("tx-1"))
        .unwrap();
    assert_eq!(first.from_balance_minor, 7_500);

    // More money moves in between
    context
        .transfer_service
        .transfer(a, b, 1_000, "USD", Some("tx-2"))
        .unwrap();

    // The replay keeps the original group id but shows today's balances
    let replay = context
        .transfer_service
        .transfer(a, b, 2_500, "USD", Some("tx-1"))
        .unwrap();
    assert_eq!(replay.transfer_group_id, first.transfer_group_id);
    assert_eq!(replay.from_balance_minor, 6_500);
    assert_eq!(replay.to_balance_minor, 3_500);
}

#[test]
fn test_same_key_on_different_routes_is_independent() {
    let (_dir, context) = new_context();
    let (a, b) = funded_accounts(&context, 10_000);

    // One key reused for a deposit and a transfer: both execute
    context
        .deposit_service
        .deposit(a, 1_000, "USD", FundingSource::Simulated, Some("shared-key"))
        .unwrap();
    context
        .transfer_service
        .transfer(a, b, 1_000, "USD", Some("shared-key"))
        .unwrap();

    let summary = context.status_service.summary().unwrap();
    assert_eq!(summary.idempotency_records, 2);
    assert_eq!(
        context.account_service.get_account(a).unwrap().balance_minor,
        10_000
    );
}

#[test]
fn test_deposit_keys_are_scoped_per_account() {
    let (_dir, context) = new_context();
    let (a, b) = funded_accounts(&context, 0);

    // The same key deposits into two different accounts: both credit
    context
        .deposit_service
        .deposit(a, 1_000, "USD", FundingSource::Simulated, Some("device-42"))
        .unwrap();
    context
        .deposit_service
        .deposit(b, 1_000, "USD", FundingSource::Simulated, Some("device-42"))
        .unwrap();

    assert_eq!(
        context.account_service.get_account(a).unwrap().balance_minor,
        1_000
    );
    assert_eq!(
        context.account_service.get_account(b).unwrap().balance_minor,
        1_000
    );
}

#[test]
fn test_unkeyed_operations_bypass_the_manager() {
    let (_dir, context) = new_context();
    let (a, _) = funded_accounts(&context, 0);

    context
        .deposit_service
        .deposit(a, 1_000, "USD", FundingSource::Simulated, None)
        .unwrap();
    context
        .deposit_service
        .deposit(a, 1_000, "USD", FundingSource::Simulated, None)
        .unwrap();

    // Both executed, nothing recorded
    let summary = context.status_service.summary().unwrap();
    assert_eq!(summary.ledger_entries, 2);
    assert_eq!(summary.idempotency_records, 0);
}

#[test]
fn test_sweep_removes_expired_records_and_frees_the_key() {
    let dir = TempDir::new().unwrap();
    let store = DuckDbLedgerStore::new(&dir.path().join("ledger.duckdb")).unwrap();
    store.ensure_schema().unwrap();
    let store = Arc::new(store);

    // TTL of one second so the records expire immediately for the sweep
    let mut config = Config::default();
    config.idempotency_ttl_seconds = 1;

    let deposits = DepositService::new(Arc::clone(&store), &config);
    let transfers = TransferService::new(Arc::clone(&store), &config);
    let idempotency = IdempotencyService::new(Arc::clone(&store), config.idempotency_ttl_seconds);

    let user = store.create_or_get_user("ada@example.com", None).unwrap();
    let account = store.create_or_get_account(user.id, "USD").unwrap();
    let other = store.create_or_get_user("bob@example.com", None).unwrap();
    let peer = store.create_or_get_account(other.id, "USD").unwrap();

    deposits
        .deposit(account.id, 5_000, "USD", FundingSource::Simulated, Some("dep-1"))
        .unwrap();
    transfers
        .transfer(account.id, peer.id, 1_000, "USD", Some("tx-1"))
        .unwrap();
    assert_eq!(store.count_idempotency_records().unwrap(), 2);

    // Both records are past their 1s TTL once a sweep runs "later"
    let swept = store
        .sweep_idempotency(Utc::now() + chrono::Duration::hours(1))
        .unwrap();
    assert_eq!(swept, 2);
    assert_eq!(store.count_idempotency_records().unwrap(), 0);

    // The key is free again: the same key now names a fresh attempt
    let outcome = deposits
        .deposit(account.id, 5_000, "USD", FundingSource::Simulated, Some("dep-1"))
        .unwrap();
    assert_eq!(outcome.new_balance_minor, 9_000);

    // sweep_expired with a live TTL removes nothing new
    assert_eq!(idempotency.sweep_expired().unwrap(), 0);
}

#[test]
fn test_exact_email_policy_distinguishes_case() {
    let dir = TempDir::new().unwrap();
    let store = DuckDbLedgerStore::new(&dir.path().join("ledger.duckdb")).unwrap();
    store.ensure_schema().unwrap();
    let store = Arc::new(store);

    let mut config = Config::default();
    config.normalize_emails = false;
    let accounts = AccountService::new(Arc::clone(&store), &config);

    // Exact policy: case differences name distinct users
    let first = accounts.open_account("Ada@Example.com", None).unwrap();
    let second = accounts.open_account("ada@example.com", None).unwrap();
    assert_ne!(first.user_id, second.user_id);
}
