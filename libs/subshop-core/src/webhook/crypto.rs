use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use subshop_db::models::InvoiceType;

use super::signature::{SignatureError, verify_crypto_pay_signature};
use super::{ParsedEvent, WebhookRejection, WebhookSource, extract_purchase_id};

#[derive(Debug, Deserialize)]
struct CryptoPayUpdate {
    update_type: String,
    #[serde(alias = "update_payload")]
    payload: Option<Invoice>,
}

#[derive(Debug, Deserialize)]
struct Invoice {
    status: Option<String>,
    payload: Option<Value>,
}

pub struct CryptoPayWebhook {
    api_token: String,
}

impl fmt::Debug for CryptoPayWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoPayWebhook").field("api_token", &"<redacted>").finish()
    }
}

impl CryptoPayWebhook {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
        }
    }
}

impl WebhookSource for CryptoPayWebhook {
    fn channel(&self) -> InvoiceType {
        InvoiceType::Crypto
    }

    fn signature_header(&self) -> &'static str {
        "crypto-pay-api-signature"
    }

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        verify_crypto_pay_signature(body, signature, &self.api_token)
    }

    fn parse(&self, body: &[u8]) -> Result<ParsedEvent, WebhookRejection> {
        let update: CryptoPayUpdate =
            serde_json::from_slice(body).map_err(|e| WebhookRejection::MalformedBody(e.to_string()))?;

        if update.update_type != "invoice_paid" {
            return Ok(ParsedEvent::Ignored(format!("update type {}", update.update_type)));
        }
        let invoice = update
            .payload
            .ok_or_else(|| WebhookRejection::MalformedBody("invoice_paid without invoice".to_string()))?;
        if invoice.status.as_deref() != Some("paid") {
            return Ok(ParsedEvent::Ignored(format!(
                "invoice status {}",
                invoice.status.as_deref().unwrap_or("missing")
            )));
        }

        let purchase_id = extract_purchase_id(invoice.payload.as_ref())?;
        Ok(ParsedEvent::Completed { purchase_id })
    }
}
