//! Payment confirmation port
//!
//! Defines the interface for verifying that an external payment actually
//! happened before a deposit is credited. The deposit engine only ever
//! queries this interface - creating payments at the provider is outside
//! the ledger core.

use serde::{Deserialize, Serialize};

use crate::domain::result::Result;

/// Terminal or in-flight state of a payment at the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Funds captured; the only state that permits crediting
    Succeeded,
    /// Still in flight at the provider
    Processing,
    /// Terminally failed or canceled
    Failed,
    /// A state this client does not recognize
    Unknown(String),
}

impl PaymentStatus {
    /// Map a provider status string onto the known states
    pub fn from_provider(s: &str) -> Self {
        match s {
            "succeeded" => PaymentStatus::Succeeded,
            "processing" | "pending" | "requires_action" => PaymentStatus::Processing,
            "failed" | "canceled" => PaymentStatus::Failed,
            other => PaymentStatus::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Succeeded => write!(f, "succeeded"),
            PaymentStatus::Processing => write!(f, "processing"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// What the provider reports about one payment
///
/// The deposit engine compares `amount_minor` and `currency` against the
/// requested deposit; any difference is fatal for that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Provider-side payment reference
    pub reference: String,
    pub status: PaymentStatus,
    /// Captured amount in minor units
    pub amount_minor: i64,
    /// ISO 4217 code, normalized to uppercase
    pub currency: String,
}

/// Payment confirmation provider trait
///
/// Implementations query an external payment system for the state of a
/// payment. The DepositService uses this trait to verify funding without
/// knowing the specifics of the gateway.
pub trait PaymentConfirmationProvider: Send + Sync {
    /// Provider name (e.g., "gateway")
    fn name(&self) -> &str;

    /// Fetch the current confirmation state of a payment
    fn get_payment(&self, reference: &str) -> Result<PaymentConfirmation>;
}
