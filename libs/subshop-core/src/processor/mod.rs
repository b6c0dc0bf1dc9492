//! Outbound session creation with external payment processors.

use async_trait::async_trait;
use std::time::Duration;
use subshop_db::models::InvoiceType;

use crate::error::Result;

pub mod crypto;
pub mod stripe;
pub mod telegram;

pub use crypto::{CryptoPayProcessor, CryptoPaySettings};
pub use stripe::{StripeProcessor, StripeSettings};
pub use telegram::StarsProcessor;

/// Everything a processor needs to open a checkout for one purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub purchase_id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub months: u32,
    /// Minor units for fiat, star count for Telegram.
    pub amount: i64,
    pub currency: String,
}

impl SessionParams {
    pub fn product_name(&self) -> String {
        let unit = if self.months == 1 { "month" } else { "months" };
        format!("Subscription — {} {}", self.months, unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSession {
    /// Processor-side identifier, stored on the purchase.
    pub session_ref: String,
    pub pay_url: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn channel(&self) -> InvoiceType;

    /// Opens a checkout tagged with `params.purchase_id` so the completion
    /// notification can be mapped back to the purchase.
    async fn create_session(&self, params: &SessionParams) -> Result<ProcessorSession>;
}

/// Shared client for every processor.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_name_pluralises() {
        let mut params = SessionParams {
            purchase_id: 1,
            telegram_id: 10,
            username: None,
            months: 1,
            amount: 300,
            currency: "usd".into(),
        };
        assert_eq!(params.product_name(), "Subscription — 1 month");
        params.months = 12;
        assert_eq!(params.product_name(), "Subscription — 12 months");
    }
}
