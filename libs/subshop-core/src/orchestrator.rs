use std::collections::HashMap;
use std::sync::Arc;
use subshop_db::models::{InvoiceType, NewPurchase};
use subshop_db::repositories::{CustomerStore, PurchaseStore};
use tracing::{error, info, warn};

use crate::config::PaymentConfig;
use crate::deadline::bounded;
use crate::error::{PaymentError, Result};
use crate::processor::{PaymentProcessor, SessionParams};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub months: u32,
    pub channel: InvoiceType,
    /// Price table the amount is read from; `None` selects the default table.
    pub pricing: Option<InvoiceType>,
}

impl SessionRequest {
    pub fn new(telegram_id: i64, username: Option<String>, months: u32, channel: InvoiceType) -> Self {
        Self {
            telegram_id,
            username,
            months,
            channel,
            pricing: Some(channel),
        }
    }

    pub fn priced_from_default_table(mut self) -> Self {
        self.pricing = None;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub purchase_id: i64,
    pub pay_url: String,
    pub amount: i64,
    pub channel: InvoiceType,
}

/// Prices a plan, records the pending purchase and opens the processor checkout.
pub struct PaymentOrchestrator {
    config: Arc<PaymentConfig>,
    customers: Arc<dyn CustomerStore>,
    purchases: Arc<dyn PurchaseStore>,
    processors: HashMap<InvoiceType, Arc<dyn PaymentProcessor>>,
}

impl PaymentOrchestrator {
    pub fn new(
        config: Arc<PaymentConfig>,
        customers: Arc<dyn CustomerStore>,
        purchases: Arc<dyn PurchaseStore>,
    ) -> Self {
        Self {
            config,
            customers,
            purchases,
            processors: HashMap::new(),
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processors.insert(processor.channel(), processor);
        self
    }

    pub fn has_processor(&self, channel: InvoiceType) -> bool {
        self.processors.contains_key(&channel)
    }

    pub async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession> {
        let limit = self.config.external_timeout();
        let channel = request.channel;

        let amount = self
            .config
            .price_for(request.pricing, request.months)
            .ok_or(PaymentError::PlanNotOffered { months: request.months })?;

        let processor = self
            .processors
            .get(&channel)
            .ok_or_else(|| PaymentError::ChannelUnavailable(channel.to_string()))?;

        let customer = bounded(
            "find_customer",
            limit,
            self.customers.find_by_telegram_id(request.telegram_id),
        )
        .await?
        .ok_or(PaymentError::CustomerNotFound(request.telegram_id))?;

        let currency = self.config.currency_for(channel).to_string();
        let purchase = bounded(
            "create_purchase",
            limit,
            self.purchases.create_pending(NewPurchase {
                customer_id: customer.id,
                plan_months: request.months as i32,
                amount,
                currency: currency.clone(),
                invoice_type: channel,
            }),
        )
        .await?;

        let params = SessionParams {
            purchase_id: purchase.id,
            telegram_id: request.telegram_id,
            username: request.username.clone(),
            months: request.months,
            amount,
            currency,
        };

        let session = match bounded("create_session", limit, processor.create_session(&params)).await {
            Ok(session) => session,
            Err(e) => {
                error!(purchase_id = purchase.id, %channel, "Payment session creation failed: {}", e);
                if let Err(mark_err) = bounded("mark_failed", limit, self.purchases.mark_failed(purchase.id)).await {
                    warn!(purchase_id = purchase.id, "Could not mark purchase failed: {}", mark_err);
                }
                return Err(match e {
                    PaymentError::Timeout { .. } | PaymentError::Processor { .. } => e,
                    other => PaymentError::processor(channel, other.to_string()),
                });
            }
        };

        if let Err(e) = bounded(
            "attach_session",
            limit,
            self.purchases.attach_session(purchase.id, &session.session_ref),
        )
        .await
        {
            // The purchase id in the processor metadata is what fulfillment relies on.
            warn!(purchase_id = purchase.id, "Failed to store session reference: {}", e);
        }

        info!(
            purchase_id = purchase.id,
            customer_id = customer.id,
            %channel,
            amount,
            months = request.months,
            "Payment session created"
        );

        Ok(PaymentSession {
            purchase_id: purchase.id,
            pay_url: session.pay_url,
            amount,
            channel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceTable;
    use crate::processor::ProcessorSession;
    use async_trait::async_trait;
    use subshop_db::memory::{MemoryCustomerStore, MemoryPurchaseStore};
    use std::time::Duration;
    use subshop_db::models::{FulfillTransition, Purchase, PurchaseStatus};

    struct FakeProcessor {
        channel: InvoiceType,
        fail: bool,
    }

    #[async_trait]
    impl PaymentProcessor for FakeProcessor {
        fn channel(&self) -> InvoiceType {
            self.channel
        }

        async fn create_session(&self, params: &SessionParams) -> Result<ProcessorSession> {
            if self.fail {
                return Err(PaymentError::processor(self.channel, "card_declined"));
            }
            Ok(ProcessorSession {
                session_ref: format!("cs_{}", params.purchase_id),
                pay_url: format!("https://pay.example/{}", params.purchase_id),
            })
        }
    }

    /// Delegates to the in-memory store but never finishes `mark_failed`.
    struct HangingMarkFailed(Arc<MemoryPurchaseStore>);

    #[async_trait]
    impl PurchaseStore for HangingMarkFailed {
        async fn create_pending(&self, purchase: NewPurchase) -> anyhow::Result<Purchase> {
            self.0.create_pending(purchase).await
        }

        async fn attach_session(&self, id: i64, session_ref: &str) -> anyhow::Result<()> {
            self.0.attach_session(id, session_ref).await
        }

        async fn mark_failed(&self, _id: i64) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn mark_fulfilled(&self, id: i64) -> anyhow::Result<FulfillTransition> {
            self.0.mark_fulfilled(id).await
        }

        async fn claim_provisioning(&self, id: i64, lease: Duration) -> anyhow::Result<bool> {
            self.0.claim_provisioning(id, lease).await
        }

        async fn mark_provisioned(&self, id: i64) -> anyhow::Result<()> {
            self.0.mark_provisioned(id).await
        }

        async fn release_provisioning(&self, id: i64) -> anyhow::Result<()> {
            self.0.release_provisioning(id).await
        }

        async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Purchase>> {
            self.0.find_by_id(id).await
        }

        async fn has_fulfilled_direct_purchase(&self, customer_id: i64) -> anyhow::Result<bool> {
            self.0.has_fulfilled_direct_purchase(customer_id).await
        }
    }

    async fn orchestrator(fail: bool) -> (PaymentOrchestrator, Arc<MemoryPurchaseStore>) {
        let purchases = Arc::new(MemoryPurchaseStore::new());
        (orchestrator_with(fail, purchases.clone()).await, purchases)
    }

    async fn orchestrator_with(fail: bool, purchases: Arc<dyn PurchaseStore>) -> PaymentOrchestrator {
        let customers = Arc::new(MemoryCustomerStore::new());
        customers.register(500).await;
        let config = Arc::new(PaymentConfig {
            stripe_enabled: true,
            prices: PriceTable {
                month_1: 300,
                month_3: 800,
                ..Default::default()
            },
            stripe_prices: Some(PriceTable {
                month_1: 350,
                ..Default::default()
            }),
            ..Default::default()
        });
        PaymentOrchestrator::new(config, customers, purchases).with_processor(Arc::new(FakeProcessor {
            channel: InvoiceType::Stripe,
            fail,
        }))
    }

    #[tokio::test]
    async fn creates_pending_purchase_with_session_ref() {
        let (orchestrator, purchases) = orchestrator(false).await;
        let session = orchestrator
            .create_session(&SessionRequest::new(500, Some("bob".into()), 1, InvoiceType::Stripe))
            .await
            .unwrap();
        assert_eq!(session.amount, 350);
        assert_eq!(session.pay_url, format!("https://pay.example/{}", session.purchase_id));

        let stored = purchases.find_by_id(session.purchase_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PurchaseStatus::Pending);
        assert_eq!(stored.external_session_ref.as_deref(), Some(format!("cs_{}", session.purchase_id).as_str()));
        assert_eq!(stored.currency, "usd");
    }

    #[tokio::test]
    async fn default_table_pricing() {
        let (orchestrator, _) = orchestrator(false).await;
        let request = SessionRequest::new(500, None, 1, InvoiceType::Stripe).priced_from_default_table();
        assert_eq!(orchestrator.create_session(&request).await.unwrap().amount, 300);
    }

    #[tokio::test]
    async fn processor_failure_marks_purchase_failed() {
        let (orchestrator, purchases) = orchestrator(true).await;
        let err = orchestrator
            .create_session(&SessionRequest::new(500, None, 1, InvoiceType::Stripe))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Processor { .. }));
        let all = purchases.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PurchaseStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_failure_bookkeeping_does_not_hold_the_caller() {
        let memory = Arc::new(MemoryPurchaseStore::new());
        let orchestrator = orchestrator_with(true, Arc::new(HangingMarkFailed(memory.clone()))).await;

        let err = orchestrator
            .create_session(&SessionRequest::new(500, None, 1, InvoiceType::Stripe))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Processor { .. }));
        let all = memory.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn rejects_before_touching_storage() {
        let (orchestrator, purchases) = orchestrator(false).await;
        assert!(matches!(
            orchestrator
                .create_session(&SessionRequest::new(500, None, 3, InvoiceType::Stripe))
                .await,
            Err(PaymentError::PlanNotOffered { months: 3 })
        ));
        assert!(matches!(
            orchestrator
                .create_session(&SessionRequest::new(500, None, 1, InvoiceType::Crypto))
                .await,
            Err(PaymentError::ChannelUnavailable(_))
        ));
        assert!(matches!(
            orchestrator
                .create_session(&SessionRequest::new(501, None, 1, InvoiceType::Stripe))
                .await,
            Err(PaymentError::CustomerNotFound(501))
        ));
        assert!(purchases.all().await.is_empty());
    }
}
