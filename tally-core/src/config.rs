//! Configuration management
//!
//! Settings live in settings.json inside the tally directory:
//! ```json
//! {
//!   "service": { "currency": "USD", "maxTransactionMinor": 50000, ... },
//!   "gateway": { "baseUrl": "https://...", "secretKey": "sk_..." }
//! }
//! ```
//! Environment variables (TALLY_*) override the file, which keeps CI and
//! local testing away from persistent settings.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "USD".to_string()
}

fn default_max_transaction_minor() -> i64 {
    // $500.00 in cents
    50_000
}

fn default_idempotency_ttl_seconds() -> i64 {
    // one day
    86_400
}

fn default_true() -> bool {
    true
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    service: ServiceSettings,
    #[serde(default)]
    gateway: Option<GatewaySettings>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceSettings {
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default = "default_max_transaction_minor")]
    max_transaction_minor: i64,
    #[serde(default = "default_idempotency_ttl_seconds")]
    idempotency_ttl_seconds: i64,
    #[serde(default = "default_true")]
    simulate_deposits: bool,
    #[serde(default = "default_true")]
    normalize_emails: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            max_transaction_minor: default_max_transaction_minor(),
            idempotency_ttl_seconds: default_idempotency_ttl_seconds(),
            simulate_deposits: true,
            normalize_emails: true,
        }
    }
}

/// Payment gateway connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySettings {
    pub base_url: String,
    pub secret_key: String,
}

/// Tally configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Service currency; every account and movement uses this
    pub currency: String,
    /// Largest single transfer/deposit, in minor units
    pub max_transaction_minor: i64,
    /// Idempotency record retention; zero or less disables expiry
    pub idempotency_ttl_seconds: i64,
    /// Allow simulated deposits (development/testing mode)
    pub simulate_deposits: bool,
    /// Trim + lowercase emails before lookup; false means exact match
    pub normalize_emails: bool,
    /// Payment gateway connection, if configured
    pub gateway: Option<GatewaySettings>,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            max_transaction_minor: default_max_transaction_minor(),
            idempotency_ttl_seconds: default_idempotency_ttl_seconds(),
            simulate_deposits: true,
            normalize_emails: true,
            gateway: None,
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the tally directory
    ///
    /// Overrides, in priority order:
    /// 1. TALLY_* environment variables (for CI/testing)
    /// 2. settings.json
    /// 3. built-in defaults
    pub fn load(tally_dir: &Path) -> Result<Self> {
        let settings_path = tally_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        let currency = match std::env::var("TALLY_CURRENCY") {
            Ok(value) if !value.trim().is_empty() => value.trim().to_uppercase(),
            _ => raw.service.currency.trim().to_uppercase(),
        };

        let max_transaction_minor = std::env::var("TALLY_MAX_TRANSACTION_MINOR")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(raw.service.max_transaction_minor);

        let idempotency_ttl_seconds = std::env::var("TALLY_IDEMPOTENCY_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(raw.service.idempotency_ttl_seconds);

        let simulate_deposits = match std::env::var("TALLY_SIMULATE_DEPOSITS").ok().as_deref() {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => false,
            _ => raw.service.simulate_deposits,
        };

        if currency.is_empty() {
            anyhow::bail!("service currency cannot be empty");
        }
        if max_transaction_minor < 1 {
            anyhow::bail!(
                "maxTransactionMinor must be at least 1, got {}",
                max_transaction_minor
            );
        }

        Ok(Self {
            currency,
            max_transaction_minor,
            idempotency_ttl_seconds,
            simulate_deposits,
            normalize_emails: raw.service.normalize_emails,
            gateway: raw.gateway.clone(),
            _raw_settings: raw,
        })
    }

    /// Save config to the tally directory
    ///
    /// Preserves settings the core doesn't manage.
    pub fn save(&self, tally_dir: &Path) -> Result<()> {
        let settings_path = tally_dir.join("settings.json");

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        settings.service.currency = self.currency.clone();
        settings.service.max_transaction_minor = self.max_transaction_minor;
        settings.service.idempotency_ttl_seconds = self.idempotency_ttl_seconds;
        settings.service.simulate_deposits = self.simulate_deposits;
        settings.service.normalize_emails = self.normalize_emails;
        settings.gateway = self.gateway.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}
