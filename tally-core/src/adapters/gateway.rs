//! Payment gateway API client
//!
//! Queries the external payment gateway for the state of a payment. Only
//! the read side of the gateway API is used here: deposits are credited
//! after verifying a payment the caller already made, never by creating
//! payments from the ledger.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::domain::result::{Error, Result};
use crate::ports::{PaymentConfirmation, PaymentConfirmationProvider, PaymentStatus};

/// Request timeout for gateway calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Payment gateway API client
#[derive(Debug)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

/// Gateway payment object as returned by GET /v1/payments/{id}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayPayment {
    id: String,
    status: String,
    /// Captured amount in the smallest currency unit
    amount_received: i64,
    currency: String,
}

impl GatewayClient {
    /// Create a new gateway client
    ///
    /// The base URL must be HTTPS; plain HTTP is only accepted for
    /// loopback hosts so tests can run against a local mock server.
    pub fn new(base_url: &str, secret_key: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid gateway URL: {}", e)))?;

        let host = parsed.host_str().unwrap_or("");
        let is_loopback = host == "localhost" || host == "127.0.0.1" || host == "::1";
        if parsed.scheme() != "https" && !is_loopback {
            return Err(Error::Config(
                "gateway URL must use HTTPS".to_string(),
            ));
        }

        if secret_key.trim().is_empty() {
            return Err(Error::Config("gateway secret key cannot be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::gateway(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    fn fetch_payment(&self, reference: &str) -> Result<GatewayPayment> {
        let url = format!("{}/v1/payments/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .map_err(|e| Error::gateway(format!("request failed: {}", e)))?;

        match response.status().as_u16() {
            200 => response
                .json::<GatewayPayment>()
                .map_err(|e| Error::gateway(format!("malformed payment response: {}", e))),
            401 | 403 => Err(Error::gateway("gateway authentication failed")),
            404 => Err(Error::gateway(format!("payment {} not found", reference))),
            429 => Err(Error::gateway("gateway rate limit exceeded")),
            status => Err(Error::gateway(format!("unexpected gateway status {}", status))),
        }
    }
}

impl PaymentConfirmationProvider for GatewayClient {
    fn name(&self) -> &str {
        "gateway"
    }

    fn get_payment(&self, reference: &str) -> Result<PaymentConfirmation> {
        let payment = self.fetch_payment(reference)?;
        Ok(PaymentConfirmation {
            reference: payment.id,
            status: PaymentStatus::from_provider(&payment.status),
            amount_minor: payment.amount_received,
            // Gateways report lowercase ISO codes; the ledger stores uppercase
            currency: payment.currency.to_uppercase(),
        })
    }
}
