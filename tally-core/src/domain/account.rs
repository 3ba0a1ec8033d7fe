//! Account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A balance holder owned by a user, one per currency
///
/// `balance_minor` is a cache over the ledger: it is adjusted in the same
/// atomic unit that appends entries, and a rebuild from the entry history
/// must reproduce it exactly. All amounts are integer minor units (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    /// Cached balance in minor units; the entry history is the source of truth
    pub balance_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a zero balance
    pub fn new(id: Uuid, user_id: Uuid, currency: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            currency: Self::normalize_currency(&currency.into()),
            balance_minor: 0,
            created_at: Utc::now(),
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.currency.trim().is_empty() {
            return Err("currency cannot be empty");
        }
        if self.balance_minor < 0 {
            return Err("balance cannot be negative");
        }
        Ok(())
    }
}
