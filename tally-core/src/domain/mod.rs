//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod entry;
mod idempotency;
pub mod result;
mod user;

pub use account::Account;
pub use entry::{validate_amount, EntryKind, EntryStatus, LedgerEntry};
pub use idempotency::IdempotencyRecord;
pub use user::User;
