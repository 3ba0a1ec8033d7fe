//! Transfer service - atomic double-entry transfers between accounts

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbLedgerStore;
use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::{validate_amount, Account};
use crate::services::idempotency::{IdempotencyCheck, IdempotencyService, TRANSFER_ROUTE};
use crate::services::logging::{LogEvent, LoggingService};

/// Result of a transfer, with both post-commit balances
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub transfer_group_id: Uuid,
    pub from_balance_minor: i64,
    pub to_balance_minor: i64,
}

/// Transfer service
pub struct TransferService {
    store: Arc<DuckDbLedgerStore>,
    idempotency: IdempotencyService,
    logging: Option<Arc<LoggingService>>,
    currency: String,
    max_transaction_minor: i64,
}

impl TransferService {
    pub fn new(store: Arc<DuckDbLedgerStore>, config: &Config) -> Self {
        let idempotency =
            IdempotencyService::new(Arc::clone(&store), config.idempotency_ttl_seconds);
        Self {
            store,
            idempotency,
            logging: None,
            currency: config.currency.clone(),
            max_transaction_minor: config.max_transaction_minor,
        }
    }

    /// Attach an event log; outcomes are then recorded best-effort
    pub fn with_logging(mut self, logging: Arc<LoggingService>) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Move `amount_minor` from one account to another
    ///
    /// With an idempotency key, a retry of the same logical request
    /// returns the original transfer group with current balances instead
    /// of moving money twice. Every failure leaves the store unchanged.
    pub fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        idempotency_key: Option<&str>,
    ) -> Result<TransferOutcome> {
        let result = self.execute(
            from_account_id,
            to_account_id,
            amount_minor,
            currency,
            idempotency_key,
        );
        self.log_outcome(&result);
        result
    }

    fn execute(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount_minor: i64,
        currency: &str,
        idempotency_key: Option<&str>,
    ) -> Result<TransferOutcome> {
        // All validation happens before any mutation
        validate_amount(amount_minor, self.max_transaction_minor)?;
        let currency = Account::normalize_currency(currency);
        if currency != self.currency {
            return Err(Error::CurrencyMismatch {
                expected: self.currency.clone(),
                got: currency,
            });
        }
        if from_account_id == to_account_id {
            return Err(Error::SameAccount);
        }

        let from = self
            .store
            .get_account(from_account_id)?
            .ok_or_else(|| Error::not_found(format!("Account {} not found", from_account_id)))?;
        let to = self
            .store
            .get_account(to_account_id)?
            .ok_or_else(|| Error::not_found(format!("Account {} not found", to_account_id)))?;
        for account in [&from, &to] {
            if account.currency != currency {
                return Err(Error::CurrencyMismatch {
                    expected: currency.clone(),
                    got: account.currency.clone(),
                });
            }
        }

        // Replay: the recorded group id with current balances, no
        // re-execution and no funds re-check
        if let Some(key) = idempotency_key {
            if let IdempotencyCheck::Replayed(result_ref) =
                self.idempotency.begin_or_replay(key, TRANSFER_ROUTE)?
            {
                let group_id = Uuid::parse_str(&result_ref).map_err(|_| {
                    Error::conflict(format!("recorded outcome {} is not a group id", result_ref))
                })?;
                return Ok(TransferOutcome {
                    transfer_group_id: group_id,
                    from_balance_minor: from.balance_minor,
                    to_balance_minor: to.balance_minor,
                });
            }
        }

        let scope = idempotency_key
            .map(|key| self.idempotency.scope(key, TRANSFER_ROUTE, Some(from.user_id)));
        let record = self.store.record_transfer(
            from_account_id,
            to_account_id,
            amount_minor,
            &currency,
            scope.as_ref(),
        )?;

        Ok(TransferOutcome {
            transfer_group_id: record.transfer_group_id,
            from_balance_minor: record.from_balance_minor,
            to_balance_minor: record.to_balance_minor,
        })
    }

    fn log_outcome(&self, result: &Result<TransferOutcome>) {
        let Some(logging) = &self.logging else {
            return;
        };
        let event = match result {
            Ok(_) => LogEvent::new("transfer_completed").with_route(TRANSFER_ROUTE),
            Err(e) => LogEvent::new("transfer_failed")
                .with_route(TRANSFER_ROUTE)
                .with_error(e.kind()),
        };
        // A logging failure must never fail the transfer itself
        let _ = logging.log(event);
    }
}
