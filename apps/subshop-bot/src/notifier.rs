use anyhow::Context;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use subshop_core::cache::MessageCache;
use subshop_core::fulfillment::FulfillmentHook;
use subshop_db::models::Purchase;
use subshop_db::repositories::CustomerStore;
use teloxide::prelude::*;
use teloxide::types::MessageId;

/// Cleans up the pay-link message and confirms the purchase in chat.
pub struct BotNotifier {
    bot: Bot,
    cache: Arc<MessageCache>,
    customers: Arc<dyn CustomerStore>,
    /// Applied to each Telegram and storage call.
    timeout: Duration,
}

impl BotNotifier {
    pub fn new(bot: Bot, cache: Arc<MessageCache>, customers: Arc<dyn CustomerStore>, timeout: Duration) -> Self {
        Self {
            bot,
            cache,
            customers,
            timeout,
        }
    }

    async fn within<T, E, F>(&self, what: &'static str, fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .with_context(|| format!("{} timed out after {:?}", what, self.timeout))?
            .map_err(Into::into)
    }
}

pub fn confirmation_text(purchase: &Purchase) -> String {
    let unit = if purchase.plan_months == 1 { "month" } else { "months" };
    format!(
        "✅ <b>Payment received!</b>\n\nYour {} {} subscription is active. Thank you!",
        purchase.plan_months, unit
    )
}

#[async_trait]
impl FulfillmentHook for BotNotifier {
    async fn on_fulfilled(&self, purchase: &Purchase) -> anyhow::Result<()> {
        if let Some(cached) = self.cache.take(purchase.id).await {
            let delete = self
                .bot
                .delete_message(ChatId(cached.chat_id), MessageId(cached.message_id))
                .send();
            if let Err(e) = self.within("delete_message", delete).await {
                tracing::warn!(purchase_id = purchase.id, "Failed to delete pay-link message: {}", e);
            }
        }

        let customer = self
            .within("find_customer", self.customers.find_by_id(purchase.customer_id))
            .await?
            .with_context(|| format!("Customer {} of purchase {} not found", purchase.customer_id, purchase.id))?;

        let send = self
            .bot
            .send_message(ChatId(customer.telegram_id), confirmation_text(purchase))
            .parse_mode(teloxide::types::ParseMode::Html)
            .send();
        self.within("send_message", send)
            .await
            .context("Failed to send payment confirmation")?;

        tracing::info!(purchase_id = purchase.id, telegram_id = customer.telegram_id, "Payment confirmed in chat");
        Ok(())
    }
}
