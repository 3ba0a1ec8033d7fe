//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// Money-movement failures get their own variants so callers can tell a
/// business rejection (insufficient funds, mismatched payment) apart from
/// a bad request or an infrastructure failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid amount: {amount} (must be 1..={max} minor units)")]
    InvalidAmount { amount: i64, max: i64 },

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    #[error("Cannot transfer to the same account")]
    SameAccount,

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment mismatch: {0}")]
    PaymentMismatch(String),

    #[error("Deposit requires a gateway confirmation; simulated deposits are disabled")]
    PaymentNotImplemented,

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a gateway error
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Stable label for the error variant, safe to log
    ///
    /// Unlike Display, carries no message payload (amounts, balances,
    /// account ids), so it can go into the event log as-is.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::SameAccount => "same_account",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::Conflict(_) => "conflict",
            Self::PaymentMismatch(_) => "payment_mismatch",
            Self::PaymentNotImplemented => "payment_not_implemented",
            Self::Gateway(_) => "gateway",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
