//! Hosted checkout sessions.
//!
//! The core only needs one call from a payment provider: open a checkout session for an
//! amount and get back its id and URL. [`StripeGateway`] implements it against the Stripe
//! REST API.

use crate::errors::{Error, GatewayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Parameters of one checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Amount in minor currency units
    pub amount_minor_units: i64,
    /// ISO currency code
    pub currency: String,
    /// Line-item name shown to the payer
    pub description: String,
    /// Redirect target after a successful payment
    pub success_url: String,
    /// Redirect target after a canceled payment
    pub cancel_url: String,
}

/// Identifiers of an opened checkout session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    /// Provider-side session id
    #[serde(rename = "id")]
    pub session_id: String,
    /// Hosted page the payer is redirected to
    #[serde(rename = "url")]
    pub session_url: String,
}

/// A provider of hosted checkout sessions.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session for `request`.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> std::result::Result<CheckoutSession, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

/// Stripe Checkout client.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
    timeout: Duration,
}

impl StripeGateway {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(secret_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
            timeout,
        })
    }

    /// Builds a client from `STRIPE_SECRET_KEY`.
    ///
    /// Returns `Ok(None)` when the key is not configured.
    pub fn from_env(timeout: Duration) -> Result<Option<Self>> {
        let Ok(secret_key) = std::env::var("STRIPE_SECRET_KEY") else {
            return Ok(None);
        };
        Self::new(secret_key, timeout).map(Some)
    }

    /// Points the client at another API origin.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            GatewayError::from(err)
        }
    }

    fn form_fields(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount_minor_units.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
        ]
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(amount = request.amount_minor_units))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> std::result::Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&Self::form_fields(request))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<StripeErrorBody>().await {
                Ok(body) => body.error.message,
                Err(e) => format!("unreadable error body: {e}"),
            };
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session = response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        debug!("Opened checkout session {}", session.session_id);
        Ok(session)
    }
}

/// Stand-in used when no provider is configured; every session request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_checkout_session(
        &self,
        _request: &CheckoutRequest,
    ) -> std::result::Result<CheckoutSession, GatewayError> {
        Err(GatewayError::Request(
            "payment gateway is not configured".to_string(),
        ))
    }
}
