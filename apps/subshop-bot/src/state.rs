use anyhow::Result;
use std::sync::Arc;
use subshop_core::cache::MessageCache;
use subshop_core::fulfillment::PurchaseFulfiller;
use subshop_core::orchestrator::PaymentOrchestrator;
use subshop_core::policy::MenuPolicy;
use subshop_core::processor::{CryptoPayProcessor, StarsProcessor, StripeProcessor, http_client};
use subshop_core::webhook::{CryptoPayWebhook, StripeWebhook, WebhookPipeline};
use subshop_core::FlowController;
use subshop_db::repositories::{CustomerStore, PurchaseStore};
use teloxide::Bot;

use crate::config::BotConfig;
use crate::notifier::BotNotifier;
use crate::webhook::WebhookState;

#[derive(Clone)]
pub struct AppState {
    pub flow: FlowController,
    pub fulfiller: Arc<PurchaseFulfiller>,
    pub cache: Arc<MessageCache>,
    pub webhooks: WebhookState,
}

impl AppState {
    /// Wires one processor per enabled channel and one webhook source per configured secret.
    pub fn build(
        config: &BotConfig,
        bot: Bot,
        customers: Arc<dyn CustomerStore>,
        purchases: Arc<dyn PurchaseStore>,
    ) -> Result<Self> {
        let payment = Arc::new(config.payment.clone());
        let client = http_client(payment.external_timeout())?;

        let mut orchestrator = PaymentOrchestrator::new(payment.clone(), customers.clone(), purchases.clone());
        if payment.stars_enabled {
            orchestrator = orchestrator.with_processor(Arc::new(StarsProcessor::new(client.clone(), config.bot_token.clone())));
        }
        if payment.stripe_enabled {
            orchestrator = orchestrator.with_processor(Arc::new(StripeProcessor::new(client.clone(), config.stripe.clone())));
        }
        if payment.crypto_enabled {
            orchestrator = orchestrator.with_processor(Arc::new(CryptoPayProcessor::new(client, config.crypto_pay.clone())));
        }

        let policy = MenuPolicy::new(payment.clone(), customers.clone(), purchases.clone());
        let flow = FlowController::new(policy, Arc::new(orchestrator));

        let cache = Arc::new(MessageCache::default());
        let notifier = BotNotifier::new(bot, cache.clone(), customers, payment.external_timeout());
        let fulfiller = Arc::new(PurchaseFulfiller::new(purchases, Arc::new(notifier), payment.external_timeout()));

        let webhooks = WebhookState {
            pipeline: WebhookPipeline::new(fulfiller.clone()),
            stripe: (!config.stripe.webhook_secret.is_empty())
                .then(|| Arc::new(StripeWebhook::new(config.stripe.webhook_secret.clone()))),
            crypto: (!config.crypto_pay.api_token.is_empty())
                .then(|| Arc::new(CryptoPayWebhook::new(config.crypto_pay.api_token.clone()))),
        };

        tracing::info!(
            stars = payment.stars_enabled,
            stripe = payment.stripe_enabled,
            crypto = payment.crypto_enabled,
            stripe_webhook = webhooks.stripe.is_some(),
            crypto_webhook = webhooks.crypto.is_some(),
            "Payment channels wired"
        );

        Ok(Self {
            flow,
            fulfiller,
            cache,
            webhooks,
        })
    }
}
