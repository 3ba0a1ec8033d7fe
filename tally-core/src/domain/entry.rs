//! Ledger entry domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};

/// What a ledger entry does to its account
///
/// Direction is carried by the kind, never by the sign of the amount.
/// Amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// External funds credited to an account
    Deposit,
    /// Credit leg of an internal transfer
    TransferIn,
    /// Debit leg of an internal transfer
    TransferOut,
    /// Manual crediting correction; never written by the engines
    Adjustment,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::TransferIn => "transfer_in",
            EntryKind::TransferOut => "transfer_out",
            EntryKind::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(EntryKind::Deposit),
            "transfer_in" => Ok(EntryKind::TransferIn),
            "transfer_out" => Ok(EntryKind::TransferOut),
            "adjustment" => Ok(EntryKind::Adjustment),
            other => Err(Error::database(format!("unknown entry kind: {}", other))),
        }
    }

    /// True if this kind increases the account balance
    pub fn is_credit(&self) -> bool {
        match self {
            EntryKind::Deposit | EntryKind::TransferIn | EntryKind::Adjustment => true,
            EntryKind::TransferOut => false,
        }
    }
}

/// Posting status of a ledger entry
///
/// The engines only ever write `Posted`; `Pending` and `Failed` exist for
/// schema compatibility with a future authorize-then-capture flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Posted,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Posted => "posted",
            EntryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "posted" => Ok(EntryStatus::Posted),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(Error::database(format!("unknown entry status: {}", other))),
        }
    }
}

/// An immutable, append-only record of one money movement leg
///
/// Entries are never updated or deleted after creation; corrections are
/// recorded as new `Adjustment` entries. The two legs of a transfer share
/// a `transfer_group_id` and reference each other via `related_entry_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub status: EntryStatus,
    /// Positive amount in minor units; direction comes from `kind`
    pub amount_minor: i64,
    pub currency: String,
    /// Links the two legs of one transfer; None for deposits
    pub transfer_group_id: Option<Uuid>,
    /// Optional back-reference to the opposite leg
    pub related_entry_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a new posted entry
    pub fn new(
        id: Uuid,
        account_id: Uuid,
        kind: EntryKind,
        amount_minor: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id,
            account_id,
            kind,
            status: EntryStatus::Posted,
            amount_minor,
            currency: currency.into(),
            transfer_group_id: None,
            related_entry_id: None,
            created_at: Utc::now(),
        }
    }

    /// Signed contribution of this entry to its account balance
    pub fn signed_amount(&self) -> i64 {
        if self.kind.is_credit() {
            self.amount_minor
        } else {
            -self.amount_minor
        }
    }
}

/// Validate a requested amount against the configured transaction cap
pub fn validate_amount(amount_minor: i64, max_minor: i64) -> Result<()> {
    if amount_minor < 1 || amount_minor > max_minor {
        return Err(Error::InvalidAmount {
            amount: amount_minor,
            max: max_minor,
        });
    }
    Ok(())
}
