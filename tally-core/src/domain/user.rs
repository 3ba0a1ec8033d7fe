//! User domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user identified by email
///
/// Users are created on first reference (opening an account for an email
/// that has never been seen) and are never deleted. Accounts hang off the
/// user, one per currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with required fields
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: None,
            created_at: Utc::now(),
        }
    }

    /// Normalize an email for lookup: trim whitespace, lowercase
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Validate user data
    pub fn validate(&self) -> Result<(), &'static str> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err("email cannot be empty");
        }
        if !email.contains('@') {
            return Err("email must contain '@'");
        }
        Ok(())
    }
}
