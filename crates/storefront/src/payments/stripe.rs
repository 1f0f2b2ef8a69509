//! Stripe REST API client.
//!
//! Only the two payment intent calls the checkout flow needs. Requests are
//! form-encoded, authenticated with the secret key as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, instrument};

use atelier_core::CurrencyCode;

use super::error::PaymentError;
use super::types::{ErrorResponse, PaymentIntent};
use super::PaymentGateway;
use crate::config::StripeConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    /// HTTP client with the configured timeouts.
    client: Client,
    /// Secret API key.
    secret_key: SecretString,
    /// API base URL without trailing slash.
    api_base: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Config` if the HTTP client cannot be built.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Config(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.clone(),
        })
    }

    /// Turn a response into a payment intent or a typed error.
    async fn parse_intent(response: Response) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();
        // The client timeout also covers the body; a stalled body stays indeterminate.
        let body = response.text().await?;
        if status.is_success() {
            return serde_json::from_str::<PaymentIntent>(&body)
                .map_err(|e| PaymentError::Response(e.to_string()));
        }

        let detail = serde_json::from_str::<ErrorResponse>(&body).ok().map(|r| r.error);
        let message = detail
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        error!(
            status = %status,
            kind = ?detail.as_ref().and_then(|d| d.kind.as_deref()),
            code = ?detail.as_ref().and_then(|d| d.code.as_deref()),
            "Stripe API error"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(PaymentError::NotFound(message));
        }
        Err(PaymentError::Api(message))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self), fields(currency = currency.as_lower()))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<PaymentIntent, PaymentError> {
        let amount = amount_minor.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", currency.as_lower()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await?;

        let intent = Self::parse_intent(response).await?;
        debug!(payment_id = %intent.id, "Payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, payment_id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{payment_id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        let intent = Self::parse_intent(response).await?;
        debug!(status = intent.status.as_str(), "Payment intent retrieved");
        Ok(intent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::StorefrontConfig;

    /// Serve one canned response, then hold the connection open.
    async fn stub_server(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        format!("http://{addr}")
    }

    fn client(api_base: String) -> StripeClient {
        let mut config = StorefrontConfig::for_testing().stripe;
        config.api_base = api_base;
        config.timeout = Duration::from_millis(300);
        StripeClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_stalled_body_is_indeterminate() {
        let base = stub_server(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"id\":",
        )
        .await;

        let err = client(base)
            .create_intent(1000, CurrencyCode::USD)
            .await
            .unwrap_err();
        assert!(err.is_indeterminate(), "{err:?}");
    }

    #[tokio::test]
    async fn test_api_errors_are_typed() {
        let base = stub_server(
            b"HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: 60\r\nconnection: close\r\n\r\n{\"error\":{\"message\":\"No such payment_intent\",\"type\":\"x\"}}   ",
        )
        .await;

        let err = client(base).retrieve_intent("pi_missing").await.unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(ref m) if m == "No such payment_intent"));
    }
}
