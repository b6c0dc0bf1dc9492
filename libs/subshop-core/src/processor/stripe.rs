use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use subshop_db::models::InvoiceType;
use tracing::{error, info};

use super::{PaymentProcessor, ProcessorSession, SessionParams};
use crate::error::{PaymentError, Result};

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl fmt::Debug for StripeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeSettings")
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct StripeProcessor {
    client: reqwest::Client,
    settings: StripeSettings,
    api_base: String,
}

impl fmt::Debug for StripeProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeProcessor")
            .field("settings", &self.settings)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl StripeProcessor {
    pub fn new(client: reqwest::Client, settings: StripeSettings) -> Self {
        Self {
            client,
            settings,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn form(&self, params: &SessionParams) -> Vec<(&'static str, String)> {
        let purchase_id = params.purchase_id.to_string();
        vec![
            ("mode", "payment".to_string()),
            ("success_url", self.settings.success_url.clone()),
            ("cancel_url", self.settings.cancel_url.clone()),
            ("client_reference_id", purchase_id.clone()),
            ("metadata[purchase_id]", purchase_id),
            ("line_items[0][price_data][currency]", params.currency.to_lowercase()),
            ("line_items[0][price_data][product_data][name]", params.product_name()),
            ("line_items[0][price_data][unit_amount]", params.amount.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
        ]
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    fn channel(&self) -> InvoiceType {
        InvoiceType::Stripe
    }

    async fn create_session(&self, params: &SessionParams) -> Result<ProcessorSession> {
        info!(
            purchase_id = params.purchase_id,
            amount = params.amount,
            currency = %params.currency,
            "Creating Stripe checkout session"
        );

        let resp = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.settings.secret_key)
            .form(&self.form(params))
            .send()
            .await
            .map_err(|e| PaymentError::processor(InvoiceType::Stripe, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| format!("HTTP {}", status));
            error!(purchase_id = params.purchase_id, %status, "Stripe rejected checkout session: {}", message);
            return Err(PaymentError::processor(InvoiceType::Stripe, message));
        }

        let session: CheckoutSession = resp
            .json()
            .await
            .map_err(|e| PaymentError::processor(InvoiceType::Stripe, format!("Invalid response: {}", e)))?;

        let pay_url = session
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PaymentError::processor(InvoiceType::Stripe, "Checkout session has no URL"))?;

        Ok(ProcessorSession {
            session_ref: session.id,
            pay_url,
        })
    }
}
