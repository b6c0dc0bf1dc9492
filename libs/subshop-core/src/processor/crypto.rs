use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use subshop_db::models::InvoiceType;
use tracing::{error, info};

use super::{PaymentProcessor, ProcessorSession, SessionParams};
use crate::error::{PaymentError, Result};

pub const CRYPTO_PAY_MAINNET: &str = "https://pay.crypt.bot/api";
pub const CRYPTO_PAY_TESTNET: &str = "https://testnet-pay.crypt.bot/api";

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CryptoPaySettings {
    pub api_token: String,
    pub testnet: bool,
}

impl CryptoPaySettings {
    pub fn api_base(&self) -> &'static str {
        if self.testnet { CRYPTO_PAY_TESTNET } else { CRYPTO_PAY_MAINNET }
    }
}

impl fmt::Debug for CryptoPaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoPaySettings")
            .field("api_token", &"<redacted>")
            .field("testnet", &self.testnet)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CryptoPayResponse {
    ok: bool,
    result: Option<CryptoInvoice>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CryptoInvoice {
    invoice_id: i64,
    bot_invoice_url: String,
}

/// Fiat-denominated Crypto Pay invoices; the customer picks the asset at checkout.
pub struct CryptoPayProcessor {
    client: reqwest::Client,
    settings: CryptoPaySettings,
    api_base: String,
}

impl fmt::Debug for CryptoPayProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoPayProcessor")
            .field("settings", &self.settings)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl CryptoPayProcessor {
    pub fn new(client: reqwest::Client, settings: CryptoPaySettings) -> Self {
        let api_base = settings.api_base().to_string();
        Self {
            client,
            settings,
            api_base,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

/// Minor units to the decimal string Crypto Pay expects.
fn fiat_amount(minor: i64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

#[async_trait]
impl PaymentProcessor for CryptoPayProcessor {
    fn channel(&self) -> InvoiceType {
        InvoiceType::Crypto
    }

    async fn create_session(&self, params: &SessionParams) -> Result<ProcessorSession> {
        info!(purchase_id = params.purchase_id, amount = params.amount, "Creating Crypto Pay invoice");

        let body = serde_json::json!({
            "currency_type": "fiat",
            "fiat": params.currency.to_uppercase(),
            "amount": fiat_amount(params.amount),
            "description": params.product_name(),
            "payload": params.purchase_id.to_string(),
            "allow_anonymous": false,
            "allow_comments": false
        });

        let resp = self
            .client
            .post(format!("{}/createInvoice", self.api_base))
            .header("Crypto-Pay-API-Token", &self.settings.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::processor(InvoiceType::Crypto, e.to_string()))?;

        let body: CryptoPayResponse = resp
            .json()
            .await
            .map_err(|e| PaymentError::processor(InvoiceType::Crypto, format!("Invalid response: {}", e)))?;

        match body.result {
            Some(invoice) if body.ok => Ok(ProcessorSession {
                session_ref: invoice.invoice_id.to_string(),
                pay_url: invoice.bot_invoice_url,
            }),
            _ => {
                let message = body
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no invoice returned".to_string());
                error!(purchase_id = params.purchase_id, "Crypto Pay error: {}", message);
                Err(PaymentError::processor(InvoiceType::Crypto, message))
            }
        }
    }
}
