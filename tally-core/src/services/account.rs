//! Account service - account opening, lookup, and transaction history

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbLedgerStore;
use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::{EntryKind, EntryStatus, LedgerEntry, User};

/// Default number of transactions returned by a history listing
const DEFAULT_TRANSACTION_LIMIT: usize = 20;

/// Upper bound on a history listing
const MAX_TRANSACTION_LIMIT: usize = 100;

/// Account as presented to callers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub currency: String,
    pub balance_minor: i64,
}

/// One ledger entry as presented in a transaction listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub status: EntryStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub transfer_group_id: Option<Uuid>,
    pub related_entry_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for TransactionView {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            account_id: entry.account_id,
            kind: entry.kind,
            status: entry.status,
            amount_minor: entry.amount_minor,
            currency: entry.currency,
            transfer_group_id: entry.transfer_group_id,
            related_entry_id: entry.related_entry_id,
            created_at: entry.created_at,
        }
    }
}

/// A transaction history listing, newest first
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionList {
    pub account_id: Uuid,
    pub items: Vec<TransactionView>,
}

/// Account service
pub struct AccountService {
    store: Arc<DuckDbLedgerStore>,
    currency: String,
    normalize_emails: bool,
}

impl AccountService {
    pub fn new(store: Arc<DuckDbLedgerStore>, config: &Config) -> Self {
        Self {
            store,
            currency: config.currency.clone(),
            normalize_emails: config.normalize_emails,
        }
    }

    /// Open (or fetch) the service-currency account for an email
    ///
    /// The user is created on first reference; the account is created on
    /// demand with a zero balance. Calling again with the same email
    /// returns the same pair.
    pub fn open_account(&self, email: &str, name: Option<&str>) -> Result<AccountView> {
        let email = if self.normalize_emails {
            User::normalize_email(email)
        } else {
            email.trim().to_string()
        };
        if email.is_empty() || !email.contains('@') {
            return Err(Error::validation(format!(
                "not a usable email address: {:?}",
                email
            )));
        }

        let user = self.store.create_or_get_user(&email, name)?;
        let account = self.store.create_or_get_account(user.id, &self.currency)?;

        Ok(AccountView {
            user_id: user.id,
            account_id: account.id,
            currency: account.currency,
            balance_minor: account.balance_minor,
        })
    }

    /// Get an account by id
    pub fn get_account(&self, account_id: Uuid) -> Result<AccountView> {
        let account = self
            .store
            .get_account(account_id)?
            .ok_or_else(|| Error::not_found(format!("Account {} not found", account_id)))?;
        Ok(AccountView {
            user_id: account.user_id,
            account_id: account.id,
            currency: account.currency,
            balance_minor: account.balance_minor,
        })
    }

    /// List an account's transactions, newest first
    ///
    /// The limit defaults to 20 and is clamped to at most 100.
    pub fn list_transactions(
        &self,
        account_id: Uuid,
        limit: Option<usize>,
    ) -> Result<TransactionList> {
        if self.store.get_account(account_id)?.is_none() {
            return Err(Error::not_found(format!("Account {} not found", account_id)));
        }

        let limit = limit
            .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
            .clamp(1, MAX_TRANSACTION_LIMIT);
        let entries = self.store.list_entries(account_id, limit)?;

        Ok(TransactionList {
            account_id,
            items: entries.into_iter().map(TransactionView::from).collect(),
        })
    }
}
