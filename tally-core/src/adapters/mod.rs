//! Adapter implementations
//!
//! Adapters bind the core to concrete technologies:
//! - DuckDB for the ledger store
//! - The payment gateway HTTP client for PaymentConfirmationProvider
//! - A mock gateway server for testing

pub mod duckdb;
pub mod gateway;

#[cfg(test)]
pub mod gateway_mock;
