//! Stripe REST client
//!
//! Talks form-encoded HTTP to the Stripe API with the secret key. Every
//! mutating call carries an `Idempotency-Key` that stays fixed across
//! retries, so a retried request never charges or subscribes twice.

use anyhow::{Context, Result};
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::domain::payments::{StripeCustomer, StripePaymentIntent, StripeSubscription};
use crate::error::ApiError;

type Params = Vec<(String, String)>;

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("Stripe request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Stripe returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Unexpected Stripe response: {0}")]
    Decode(String),
}

impl StripeError {
    /// Network failures, rate limits and 5xx are worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Decode(_) => false,
        }
    }
}

impl From<StripeError> for ApiError {
    fn from(err: StripeError) -> Self {
        match err {
            // Card declines and similar are the caller's to fix
            StripeError::Api {
                status: StatusCode::PAYMENT_REQUIRED,
                message,
            } => ApiError::bad_request(message),
            other => {
                error!(error = %other, "Stripe call failed");
                ApiError::Internal(anyhow::anyhow!("Payment provider error: {}", other))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the Stripe API.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(base_url: &str, secret_key: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create Stripe HTTP client")?;

        tracing::info!(base_url = base_url, "Stripe client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_interval(Duration::from_secs(4))
            .with_max_elapsed_time(Some(Duration::from_secs(15)))
            .build()
    }

    async fn send_once<R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        params: &Params,
        idempotency_key: &str,
    ) -> Result<R, StripeError> {
        let mut req = self
            .client
            .request(method.clone(), url)
            .bearer_auth(&self.secret_key);

        if method == Method::POST {
            req = req.header("Idempotency-Key", idempotency_key).form(params);
        }

        let response = req.send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| StripeError::Decode(e.to_string()));
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| format!("Stripe error: {}", status));

        Err(StripeError::Api { status, message })
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Params,
    ) -> Result<R, StripeError> {
        let url = format!("{}{}", self.base_url, path);
        let idempotency_key = Uuid::new_v4().to_string();

        debug!(url = %url, method = %method, "Stripe request");

        retry(Self::retry_policy(), || async {
            self.send_once(method.clone(), &url, &params, &idempotency_key)
                .await
                .map_err(|e| {
                    if e.is_retryable() {
                        warn!(error = %e, path = path, "Transient Stripe error, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
        })
        .await
    }

    async fn post<R: DeserializeOwned>(&self, path: &str, params: Params) -> Result<R, StripeError> {
        self.request(Method::POST, path, params).await
    }

    // =========================================================================
    // Customers
    // =========================================================================

    #[instrument(skip(self, email))]
    pub async fn create_customer(
        &self,
        user_id: Uuid,
        email: &str,
        name: Option<&str>,
    ) -> Result<StripeCustomer, StripeError> {
        let mut params = vec![
            ("email".to_string(), email.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        if let Some(name) = name {
            params.push(("name".to_string(), name.to_string()));
        }
        self.post("/v1/customers", params).await
    }

    /// Attach a payment method and make it the customer's invoice default.
    #[instrument(skip(self))]
    pub async fn attach_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), StripeError> {
        let _: serde_json::Value = self
            .post(
                &format!("/v1/payment_methods/{}/attach", payment_method_id),
                vec![("customer".to_string(), customer_id.to_string())],
            )
            .await?;

        let _: StripeCustomer = self
            .post(
                &format!("/v1/customers/{}", customer_id),
                vec![(
                    "invoice_settings[default_payment_method]".to_string(),
                    payment_method_id.to_string(),
                )],
            )
            .await?;

        Ok(())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Create a subscription left incomplete until its first invoice is paid.
    #[instrument(skip(self))]
    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<StripeSubscription, StripeError> {
        self.post(
            "/v1/subscriptions",
            vec![
                ("customer".to_string(), customer_id.to_string()),
                ("items[0][price]".to_string(), price_id.to_string()),
                ("payment_behavior".to_string(), "default_incomplete".to_string()),
                ("expand[]".to_string(), "latest_invoice.payment_intent".to_string()),
                ("metadata[user_id]".to_string(), user_id.to_string()),
                ("metadata[plan_id]".to_string(), plan_id.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn cancel_at_period_end(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, StripeError> {
        self.post(
            &format!("/v1/subscriptions/{}", subscription_id),
            vec![("cancel_at_period_end".to_string(), "true".to_string())],
        )
        .await
    }

    /// Cancel immediately.
    #[instrument(skip(self))]
    pub async fn delete_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, StripeError> {
        self.request(
            Method::DELETE,
            &format!("/v1/subscriptions/{}", subscription_id),
            Vec::new(),
        )
        .await
    }

    // =========================================================================
    // Payment intents
    // =========================================================================

    /// Create a payment intent for an order. Supplying a payment method also
    /// confirms the intent.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        customer_id: &str,
        order_id: Uuid,
        user_id: Uuid,
        payment_method_id: Option<&str>,
    ) -> Result<StripePaymentIntent, StripeError> {
        let mut params = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("metadata[order_id]".to_string(), order_id.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
            (
                "automatic_payment_methods[allow_redirects]".to_string(),
                "never".to_string(),
            ),
        ];
        if let Some(pm) = payment_method_id {
            params.push(("payment_method".to_string(), pm.to_string()));
            params.push(("confirm".to_string(), "true".to_string()));
        }
        self.post("/v1/payment_intents", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: StatusCode) -> StripeError {
        StripeError::Api {
            status,
            message: "nope".to_string(),
        }
    }

    #[test]
    fn retries_only_transient_failures() {
        assert!(api_error(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(api_error(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!api_error(StatusCode::BAD_REQUEST).is_retryable());
        assert!(!api_error(StatusCode::PAYMENT_REQUIRED).is_retryable());
        assert!(!StripeError::Decode("bad".to_string()).is_retryable());
    }

    #[test]
    fn card_errors_are_client_errors() {
        let err: ApiError = api_error(StatusCode::PAYMENT_REQUIRED).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = api_error(StatusCode::UNAUTHORIZED).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
