//! Port definitions
//!
//! Traits for external collaborators. Adapters provide the concrete
//! implementations.

pub mod payment_provider;

pub use payment_provider::{PaymentConfirmation, PaymentConfirmationProvider, PaymentStatus};
