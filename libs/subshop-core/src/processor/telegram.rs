use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use subshop_db::models::InvoiceType;
use tracing::{error, info};

use super::{PaymentProcessor, ProcessorSession, SessionParams};
use crate::error::{PaymentError, Result};
use crate::fulfillment::StarsPayload;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Deserialize)]
struct TgResponse {
    ok: bool,
    result: Option<String>,
    description: Option<String>,
}

/// Telegram Stars invoices through the Bot API `createInvoiceLink` method.
pub struct StarsProcessor {
    client: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl fmt::Debug for StarsProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StarsProcessor")
            .field("bot_token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl StarsProcessor {
    pub fn new(client: reqwest::Client, bot_token: impl Into<String>) -> Self {
        Self {
            client,
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PaymentProcessor for StarsProcessor {
    fn channel(&self) -> InvoiceType {
        InvoiceType::Telegram
    }

    async fn create_session(&self, params: &SessionParams) -> Result<ProcessorSession> {
        info!(purchase_id = params.purchase_id, stars = params.amount, "Creating Telegram Stars invoice");

        if self.bot_token.is_empty() {
            return Err(PaymentError::processor(InvoiceType::Telegram, "Bot token required for Stars"));
        }

        let payload = StarsPayload {
            purchase_id: params.purchase_id,
            username: params.username.clone().unwrap_or_default(),
        };
        let title = params.product_name();
        let body = serde_json::json!({
            "title": title,
            "description": title,
            "payload": payload.to_string(),
            "provider_token": "",
            "currency": "XTR",
            "prices": [{ "label": title, "amount": params.amount }]
        });

        let res = self
            .client
            .post(format!("{}/bot{}/createInvoiceLink", self.api_base, self.bot_token))
            .json(&body)
            .send()
            .await
            // reqwest errors embed the request URL, which carries the token.
            .map_err(|e| PaymentError::processor(InvoiceType::Telegram, e.without_url().to_string()))?;

        let tg_res: TgResponse = res
            .json()
            .await
            .map_err(|e| PaymentError::processor(InvoiceType::Telegram, e.without_url().to_string()))?;

        match (tg_res.ok, tg_res.result) {
            (true, Some(link)) => Ok(ProcessorSession {
                session_ref: payload.to_string(),
                pay_url: link,
            }),
            _ => {
                let message = tg_res.description.unwrap_or_else(|| "no invoice link returned".to_string());
                error!(purchase_id = params.purchase_id, "Failed to create Stars invoice: {}", message);
                Err(PaymentError::processor(InvoiceType::Telegram, message))
            }
        }
    }
}
