//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and store access. Each service
//! focuses on a specific use case or feature area.

mod account;
mod deposit;
mod doctor;
mod idempotency;
pub mod logging;
pub mod migration;
mod status;
mod transfer;

pub use account::{AccountService, AccountView, TransactionList, TransactionView};
pub use deposit::{DepositOutcome, DepositService, FundingSource};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use idempotency::{deposit_route, IdempotencyCheck, IdempotencyService, TRANSFER_ROUTE};
pub use logging::{LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use status::{StatusService, StatusSummary};
pub use transfer::{TransferOutcome, TransferService};
