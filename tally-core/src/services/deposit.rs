//! Deposit service - crediting accounts from external funding events

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbLedgerStore;
use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::{validate_amount, Account};
use crate::ports::{PaymentConfirmationProvider, PaymentStatus};
use crate::services::idempotency::{deposit_route, IdempotencyCheck, IdempotencyService};
use crate::services::logging::{LogEvent, LoggingService};

/// How a deposit claims to be funded
#[derive(Debug, Clone)]
pub enum FundingSource {
    /// Development/testing mode: credit unconditionally
    Simulated,
    /// Credit only after verifying this payment at the gateway
    GatewayPayment { payment_ref: String },
}

/// Result of a deposit, with the post-commit balance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositOutcome {
    pub entry_id: Uuid,
    pub new_balance_minor: i64,
}

/// Deposit service
pub struct DepositService {
    store: Arc<DuckDbLedgerStore>,
    idempotency: IdempotencyService,
    provider: Option<Arc<dyn PaymentConfirmationProvider>>,
    logging: Option<Arc<LoggingService>>,
    currency: String,
    max_transaction_minor: i64,
    simulate_deposits: bool,
}

impl DepositService {
    pub fn new(store: Arc<DuckDbLedgerStore>, config: &Config) -> Self {
        let idempotency =
            IdempotencyService::new(Arc::clone(&store), config.idempotency_ttl_seconds);
        Self {
            store,
            idempotency,
            provider: None,
            logging: None,
            currency: config.currency.clone(),
            max_transaction_minor: config.max_transaction_minor,
            simulate_deposits: config.simulate_deposits,
        }
    }

    /// Attach the payment confirmation provider for gateway-funded deposits
    pub fn with_provider(mut self, provider: Arc<dyn PaymentConfirmationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attach an event log; outcomes are then recorded best-effort
    pub fn with_logging(mut self, logging: Arc<LoggingService>) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Credit `amount_minor` to an account from an external funding event
    ///
    /// A gateway-funded deposit is only credited after the provider
    /// confirms the payment succeeded with exactly the requested amount
    /// and currency. Verification happens before the store lock is taken;
    /// the credit itself is one atomic unit.
    pub fn deposit(
        &self,
        account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        funding: FundingSource,
        idempotency_key: Option<&str>,
    ) -> Result<DepositOutcome> {
        let result = self.execute(account_id, amount_minor, currency, funding, idempotency_key);
        self.log_outcome(account_id, &result);
        result
    }

    fn execute(
        &self,
        account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        funding: FundingSource,
        idempotency_key: Option<&str>,
    ) -> Result<DepositOutcome> {
        validate_amount(amount_minor, self.max_transaction_minor)?;
        let currency = Account::normalize_currency(currency);
        if currency != self.currency {
            return Err(Error::CurrencyMismatch {
                expected: self.currency.clone(),
                got: currency,
            });
        }

        let account = self
            .store
            .get_account(account_id)?
            .ok_or_else(|| Error::not_found(format!("Account {} not found", account_id)))?;
        if account.currency != currency {
            return Err(Error::CurrencyMismatch {
                expected: currency.clone(),
                got: account.currency.clone(),
            });
        }

        let route = deposit_route(account_id);

        // Replay: the recorded entry id with the current balance
        if let Some(key) = idempotency_key {
            if let IdempotencyCheck::Replayed(result_ref) =
                self.idempotency.begin_or_replay(key, &route)?
            {
                let entry_id = Uuid::parse_str(&result_ref).map_err(|_| {
                    Error::conflict(format!("recorded outcome {} is not an entry id", result_ref))
                })?;
                return Ok(DepositOutcome {
                    entry_id,
                    new_balance_minor: account.balance_minor,
                });
            }
        }

        // Funding proof comes before the store lock: no external calls
        // inside the critical section
        match funding {
            FundingSource::Simulated => {
                if !self.simulate_deposits {
                    return Err(Error::PaymentNotImplemented);
                }
            }
            FundingSource::GatewayPayment { ref payment_ref } => {
                let provider = self.provider.as_ref().ok_or(Error::PaymentNotImplemented)?;
                let confirmation = provider.get_payment(payment_ref)?;

                if confirmation.status != PaymentStatus::Succeeded {
                    return Err(Error::PaymentMismatch(format!(
                        "payment {} not succeeded (status={})",
                        payment_ref, confirmation.status
                    )));
                }
                if confirmation.amount_minor != amount_minor {
                    return Err(Error::PaymentMismatch(format!(
                        "amount mismatch: expected {}, got {}",
                        amount_minor, confirmation.amount_minor
                    )));
                }
                if confirmation.currency != currency {
                    return Err(Error::PaymentMismatch(format!(
                        "currency mismatch: expected {}, got {}",
                        currency, confirmation.currency
                    )));
                }
            }
        }

        let scope =
            idempotency_key.map(|key| self.idempotency.scope(key, route, Some(account.user_id)));
        let record =
            self.store
                .record_deposit(account_id, amount_minor, &currency, scope.as_ref())?;

        Ok(DepositOutcome {
            entry_id: record.entry_id,
            new_balance_minor: record.new_balance_minor,
        })
    }

    fn log_outcome(&self, account_id: Uuid, result: &Result<DepositOutcome>) {
        let Some(logging) = &self.logging else {
            return;
        };
        let route = deposit_route(account_id);
        let event = match result {
            Ok(_) => LogEvent::new("deposit_completed").with_route(route),
            Err(e) => LogEvent::new("deposit_failed")
                .with_route(route)
                .with_error(e.kind()),
        };
        let _ = logging.log(event);
    }
}
