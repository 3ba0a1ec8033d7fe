//! Tally Core - minimal double-entry ledger for wallet top-ups and transfers
//!
//! This crate implements the ledger core following hexagonal architecture:
//!
//! - **domain**: Core business entities (User, Account, LedgerEntry, IdempotencyRecord)
//! - **ports**: Trait definitions for external dependencies (PaymentConfirmationProvider)
//! - **services**: Business logic orchestration (transfers, deposits, idempotency)
//! - **adapters**: Concrete implementations (DuckDB store, payment gateway client)
//!
//! Every money movement is recorded double-entry in integer minor units,
//! and mutating operations deduplicate retried requests through
//! caller-supplied idempotency keys.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbLedgerStore;
use adapters::gateway::GatewayClient;
use config::Config;
use ports::PaymentConfirmationProvider;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{Account, EntryKind, EntryStatus, IdempotencyRecord, LedgerEntry, User};

/// Main context for Tally operations
///
/// This is the primary entry point for all business logic. It holds the
/// ledger store, configuration, and all services.
pub struct TallyContext {
    pub config: Config,
    pub store: Arc<DuckDbLedgerStore>,
    pub account_service: AccountService,
    pub transfer_service: TransferService,
    pub deposit_service: DepositService,
    pub idempotency_service: IdempotencyService,
    pub status_service: StatusService,
    pub doctor_service: DoctorService,
    pub logging: Arc<LoggingService>,
}

impl TallyContext {
    /// Create a new Tally context
    ///
    /// Opens (or creates) the ledger database in `tally_dir`, applies
    /// pending migrations, and wires up the services. The payment gateway
    /// client is only constructed when gateway settings are present;
    /// without it, only simulated deposits are possible.
    pub fn new(tally_dir: &Path) -> Result<Self> {
        let config = Config::load(tally_dir)?;

        let db_path = tally_dir.join("tally.duckdb");
        let store = Arc::new(DuckDbLedgerStore::new(&db_path)?);

        // Initialize schema
        store.ensure_schema()?;

        let logging = Arc::new(LoggingService::new(tally_dir, env!("CARGO_PKG_VERSION"))?);

        let provider: Option<Arc<dyn PaymentConfirmationProvider>> = match &config.gateway {
            Some(gateway) => {
                let client = GatewayClient::new(&gateway.base_url, &gateway.secret_key)?;
                Some(Arc::new(client) as Arc<dyn PaymentConfirmationProvider>)
            }
            None => None,
        };

        // Create services
        let account_service = AccountService::new(Arc::clone(&store), &config);
        let transfer_service =
            TransferService::new(Arc::clone(&store), &config).with_logging(Arc::clone(&logging));
        let mut deposit_service =
            DepositService::new(Arc::clone(&store), &config).with_logging(Arc::clone(&logging));
        if let Some(provider) = provider {
            deposit_service = deposit_service.with_provider(provider);
        }
        let idempotency_service =
            IdempotencyService::new(Arc::clone(&store), config.idempotency_ttl_seconds);
        let status_service = StatusService::new(Arc::clone(&store), &config);
        let doctor_service = DoctorService::new(Arc::clone(&store));

        Ok(Self {
            config,
            store,
            account_service,
            transfer_service,
            deposit_service,
            idempotency_service,
            status_service,
            doctor_service,
            logging,
        })
    }
}
