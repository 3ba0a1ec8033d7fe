//! Mock payment gateway server for testing
//!
//! A small HTTP server that simulates the gateway's payment query API,
//! allowing deposit verification to be tested without a real gateway
//! account. It implements the same response structure as the real API:
//! - GET /v1/payments/{id} returns { id, status, amountReceived, currency }

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde::Serialize;

/// A payment the mock server knows about
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockPayment {
    pub id: String,
    pub status: String,
    pub amount_received: i64,
    pub currency: String,
}

impl MockPayment {
    /// A captured payment ready to back a deposit
    pub fn succeeded(id: &str, amount_minor: i64, currency: &str) -> Self {
        Self {
            id: id.to_string(),
            status: "succeeded".to_string(),
            amount_received: amount_minor,
            currency: currency.to_lowercase(),
        }
    }
}

/// Configuration for the mock gateway
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Payments the server will answer for
    pub payments: Vec<MockPayment>,
    /// Whether to simulate authentication failure
    pub fail_auth: bool,
    /// Delay in milliseconds before responding
    pub delay_ms: u64,
}

/// Mock gateway server for testing
pub struct MockGatewayServer {
    port: u16,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockGatewayServer {
    /// Start a new mock server on a random available port
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        // Non-blocking accept so the server thread can notice shutdown
        listener.set_nonblocking(true)?;

        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let cfg = config.clone();
                        thread::spawn(move || {
                            handle_connection(stream, &cfg);
                        });
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get the base URL for this mock server
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockGatewayServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, config: &MockConfig) {
    let mut buffer = [0; 4096];

    if let Ok(n) = stream.read(&mut buffer) {
        let request = String::from_utf8_lossy(&buffer[..n]);

        if config.delay_ms > 0 {
            thread::sleep(std::time::Duration::from_millis(config.delay_ms));
        }

        let first_line = request.lines().next().unwrap_or("");
        let parts: Vec<&str> = first_line.split_whitespace().collect();

        if parts.len() < 2 {
            send_response(&mut stream, 400, "Bad Request", r#"{"error": "Invalid request"}"#);
            return;
        }

        let method = parts[0];
        let path = parts[1];

        let has_auth = request
            .to_lowercase()
            .lines()
            .any(|l| l.starts_with("authorization: bearer sk_"));

        if config.fail_auth || !has_auth {
            send_response(&mut stream, 401, "Unauthorized", r#"{"error": "Invalid API key"}"#);
            return;
        }

        if method != "GET" {
            send_response(
                &mut stream,
                405,
                "Method Not Allowed",
                r#"{"error": "Method not allowed"}"#,
            );
            return;
        }

        match path.strip_prefix("/v1/payments/") {
            Some(payment_id) if !payment_id.is_empty() => {
                match config.payments.iter().find(|p| p.id == payment_id) {
                    Some(payment) => {
                        let json = serde_json::to_string(payment).unwrap();
                        send_response(&mut stream, 200, "OK", &json);
                    }
                    None => {
                        send_response(
                            &mut stream,
                            404,
                            "Not Found",
                            r#"{"error": "No such payment"}"#,
                        );
                    }
                }
            }
            _ => {
                send_response(&mut stream, 404, "Not Found", r#"{"error": "Endpoint not found"}"#);
            }
        }
    }
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::GatewayClient;
    use crate::domain::result::Error;
    use crate::ports::{PaymentConfirmationProvider, PaymentStatus};

    #[test]
    fn test_mock_server_returns_known_payment() {
        let server = MockGatewayServer::start(MockConfig {
            payments: vec![MockPayment::succeeded("pay_123", 10_000, "usd")],
            ..Default::default()
        })
        .unwrap();

        let client = GatewayClient::new(&server.base_url(), "sk_test_key").unwrap();
        let confirmation = client.get_payment("pay_123").unwrap();

        assert_eq!(confirmation.reference, "pay_123");
        assert_eq!(confirmation.status, PaymentStatus::Succeeded);
        assert_eq!(confirmation.amount_minor, 10_000);
        // Lowercase gateway code comes back uppercased
        assert_eq!(confirmation.currency, "USD");
    }

    #[test]
    fn test_mock_server_unknown_payment_is_gateway_error() {
        let server = MockGatewayServer::start(MockConfig::default()).unwrap();

        let client = GatewayClient::new(&server.base_url(), "sk_test_key").unwrap();
        let err = client.get_payment("pay_missing").unwrap_err();

        assert!(matches!(err, Error::Gateway(_)));
        assert!(err.to_string().contains("pay_missing"));
    }

    #[test]
    fn test_mock_server_auth_failure() {
        let server = MockGatewayServer::start(MockConfig {
            fail_auth: true,
            ..Default::default()
        })
        .unwrap();

        let client = GatewayClient::new(&server.base_url(), "sk_test_key").unwrap();
        let err = client.get_payment("pay_123").unwrap_err();

        assert!(err.to_string().contains("authentication"));
    }

    #[test]
    fn test_non_succeeded_payment_maps_to_processing() {
        let server = MockGatewayServer::start(MockConfig {
            payments: vec![MockPayment {
                id: "pay_pending".to_string(),
                status: "processing".to_string(),
                amount_received: 0,
                currency: "usd".to_string(),
            }],
            ..Default::default()
        })
        .unwrap();

        let client = GatewayClient::new(&server.base_url(), "sk_test_key").unwrap();
        let confirmation = client.get_payment("pay_pending").unwrap();

        assert_eq!(confirmation.status, PaymentStatus::Processing);
    }
}
