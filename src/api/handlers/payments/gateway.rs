//! Payment gateway seam and the Paystack client behind it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::APP_USER_AGENT;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.paystack.co";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    base_url: String,
    secret_key: SecretString,
    callback_url: Option<String>,
    timeout: Duration,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            secret_key,
            callback_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_callback_url(mut self, callback_url: Option<String>) -> Self {
        self.callback_url = callback_url;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn secret_key(&self) -> &SecretString {
        &self.secret_key
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GatewayMetadata {
    pub donor_name: String,
    pub cause: String,
}

/// Request to open a payment with the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTransaction {
    /// Amount in minor units (kobo).
    pub amount_minor: i64,
    pub email: String,
    /// Local transaction id, echoed back by the gateway as `reference`.
    pub reference: Uuid,
    pub metadata: GatewayMetadata,
}

/// Gateway answer to an open request that reached it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub accepted: bool,
    pub authorization_url: Option<String>,
    pub gateway_reference: Option<String>,
    pub message: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a transaction.
    ///
    /// A rejection the gateway reports is `Ok` with `accepted == false`;
    /// `Err` means the gateway could not be reached or answered garbage.
    async fn open_transaction(&self, request: &OpenTransaction) -> Result<GatewayResponse>;
}

/// Whether `err` is the HTTP client giving up on its own deadline.
///
/// The client timeout and the caller's `tokio::time::timeout` share one
/// duration, so either may fire first.
#[must_use]
pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|err| err.is_timeout())
    })
}

#[derive(Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    amount: String,
    reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a GatewayMetadata,
}

#[derive(Deserialize, Debug)]
struct InitializeResponse {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<InitializeData>,
}

#[derive(Deserialize, Debug)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug)]
pub struct PaystackGateway {
    client: Client,
    config: GatewayConfig,
}

impl PaystackGateway {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout())
            .build()
            .context("Failed to build payment gateway client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn open_transaction(&self, request: &OpenTransaction) -> Result<GatewayResponse> {
        let url = format!("{}/transaction/initialize", self.config.base_url());
        let body = InitializeRequest {
            email: &request.email,
            amount: request.amount_minor.to_string(),
            reference: request.reference.to_string(),
            callback_url: self.config.callback_url.as_deref(),
            metadata: &request.metadata,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key().expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to reach payment gateway")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read payment gateway response")?;

        let parsed: InitializeResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(err) if status.is_success() => {
                return Err(err).context("Invalid payment gateway response");
            }
            Err(_) => {
                warn!("Payment gateway returned {status} without a JSON body");
                return Ok(GatewayResponse {
                    accepted: false,
                    authorization_url: None,
                    gateway_reference: None,
                    message: format!("gateway returned {status}"),
                });
            }
        };

        debug!("Payment gateway answered {status}: {}", parsed.message);

        match parsed.data {
            Some(data) if parsed.status && status.is_success() => Ok(GatewayResponse {
                accepted: true,
                authorization_url: Some(data.authorization_url),
                gateway_reference: Some(data.reference),
                message: parsed.message,
            }),
            _ => Ok(GatewayResponse {
                accepted: false,
                authorization_url: None,
                gateway_reference: None,
                message: if parsed.message.is_empty() {
                    format!("gateway returned {status}")
                } else {
                    parsed.message
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn open_request(reference: Uuid) -> OpenTransaction {
        OpenTransaction {
            amount_minor: 250_000,
            email: "ada@giveaid.com".to_string(),
            reference,
            metadata: GatewayMetadata {
                donor_name: "Ada".to_string(),
                cause: "Clean water".to_string(),
            },
        }
    }

    fn gateway(server: &MockServer) -> Result<PaystackGateway> {
        PaystackGateway::new(
            GatewayConfig::new(SecretString::from("sk_test_123".to_string()))
                .with_base_url(server.uri())
                .with_callback_url(Some("https://giveaid.com/thanks".to_string())),
        )
    }

    #[tokio::test]
    async fn accepted_transaction_returns_authorization_url() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let reference = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("Authorization", "Bearer sk_test_123"))
            .and(body_json(json!({
                "email": "ada@giveaid.com",
                "amount": "250000",
                "reference": reference.to_string(),
                "callback_url": "https://giveaid.com/thanks",
                "metadata": { "donor_name": "Ada", "cause": "Clean water" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/abc",
                    "access_code": "abc",
                    "reference": reference.to_string()
                }
            })))
            .mount(&server)
            .await;

        let response = gateway(&server)?
            .open_transaction(&open_request(reference))
            .await?;
        assert!(response.accepted);
        assert_eq!(
            response.authorization_url.as_deref(),
            Some("https://checkout.paystack.com/abc")
        );
        assert_eq!(
            response.gateway_reference,
            Some(reference.to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejection_carries_gateway_message() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": false,
                "message": "Invalid email address passed"
            })))
            .mount(&server)
            .await;

        let response = gateway(&server)?
            .open_transaction(&open_request(Uuid::new_v4()))
            .await?;
        if response.accepted {
            bail!("expected rejection");
        }
        assert_eq!(response.message, "Invalid email address passed");
        Ok(())
    }

    #[tokio::test]
    async fn garbage_success_body_is_an_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = gateway(&server)?
            .open_transaction(&open_request(Uuid::new_v4()))
            .await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn server_error_without_json_is_a_rejection() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let response = gateway(&server)?
            .open_transaction(&open_request(Uuid::new_v4()))
            .await?;
        assert!(!response.accepted);
        assert!(response.message.contains("503"));
        Ok(())
    }

    #[tokio::test]
    async fn slow_gateway_is_reported_as_a_timeout() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": true, "message": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let gateway = PaystackGateway::new(
            GatewayConfig::new(SecretString::from("sk_test_123".to_string()))
                .with_base_url(server.uri())
                .with_timeout(Duration::from_millis(200)),
        )?;
        let Err(err) = gateway
            .open_transaction(&open_request(Uuid::new_v4()))
            .await
        else {
            bail!("expected the client to time out");
        };
        assert!(is_timeout(&err), "{err:#}");
        Ok(())
    }

    #[test]
    fn other_errors_are_not_timeouts() {
        assert!(!is_timeout(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = GatewayConfig::new(SecretString::from("sk".to_string()))
            .with_base_url("https://api.paystack.co/".to_string());
        assert_eq!(config.base_url(), "https://api.paystack.co");
    }
}
