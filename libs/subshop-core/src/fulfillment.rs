//! Marking purchases complete, exactly once, and notifying downstream provisioning.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use subshop_db::models::{FulfillTransition, InvoiceType, Purchase};
use subshop_db::repositories::PurchaseStore;
use tracing::{debug, error, info, warn};

use crate::deadline::bounded;
use crate::error::{PaymentError, Result};

/// The in-chat invoice payload: `<purchaseId>&<username>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarsPayload {
    pub purchase_id: i64,
    pub username: String,
}

impl fmt::Display for StarsPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}&{}", self.purchase_id, self.username)
    }
}

impl FromStr for StarsPayload {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        let (id, username) = s
            .split_once('&')
            .ok_or_else(|| PaymentError::MalformedInput(format!("Stars payload '{}' has no username part", s)))?;
        let purchase_id = id
            .parse()
            .map_err(|_| PaymentError::MalformedInput(format!("Stars payload '{}' has a non-numeric purchase id", s)))?;
        Ok(Self {
            purchase_id,
            username: username.to_string(),
        })
    }
}

/// Downstream provisioning. Runs after the transition to fulfilled and is retried on
/// redelivery until it succeeds once.
#[async_trait]
pub trait FulfillmentHook: Send + Sync {
    async fn on_fulfilled(&self, purchase: &Purchase) -> anyhow::Result<()>;
}

pub struct NoopHook;

#[async_trait]
impl FulfillmentHook for NoopHook {
    async fn on_fulfilled(&self, _purchase: &Purchase) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    /// This call ran the hook: right after the transition, or on a redelivery after an
    /// earlier hook failure.
    Fulfilled(Purchase),
    /// Redelivery; nothing happened.
    AlreadyFulfilled(Purchase),
}

impl FulfillmentOutcome {
    pub fn purchase(&self) -> &Purchase {
        match self {
            FulfillmentOutcome::Fulfilled(p) | FulfillmentOutcome::AlreadyFulfilled(p) => p,
        }
    }
}

#[async_trait]
pub trait Fulfiller: Send + Sync {
    async fn fulfill(&self, purchase_id: i64, channel: InvoiceType) -> Result<FulfillmentOutcome>;
}

/// How long a delivery may hold the provisioning lease before another may take over.
pub const PROVISIONING_LEASE: Duration = Duration::from_secs(5 * 60);

pub struct PurchaseFulfiller {
    purchases: Arc<dyn PurchaseStore>,
    hook: Arc<dyn FulfillmentHook>,
    timeout: Duration,
    lease: Duration,
}

impl PurchaseFulfiller {
    pub fn new(purchases: Arc<dyn PurchaseStore>, hook: Arc<dyn FulfillmentHook>, timeout: Duration) -> Self {
        Self {
            purchases,
            hook,
            timeout,
            lease: PROVISIONING_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Runs the hook under the lease. A failure releases the lease and surfaces as a
    /// retryable error so the processor redelivers.
    async fn provision(&self, purchase: &Purchase) -> Result<()> {
        let purchase_id = purchase.id;
        let hooked = bounded("fulfillment_hook", self.timeout, async {
            self.hook
                .on_fulfilled(purchase)
                .await
                .map_err(|e| PaymentError::Provisioning {
                    purchase_id,
                    message: format!("{:#}", e),
                })
        })
        .await;

        if let Err(e) = hooked {
            error!(purchase_id, "Fulfillment hook failed: {}", e);
            if let Err(release_err) = bounded(
                "release_provisioning",
                self.timeout,
                self.purchases.release_provisioning(purchase_id),
            )
            .await
            {
                warn!(purchase_id, "Could not release provisioning lease: {}", release_err);
            }
            return Err(e);
        }

        bounded("mark_provisioned", self.timeout, self.purchases.mark_provisioned(purchase_id)).await
    }

    /// Accepts a Stars pre-checkout only for a known, unpaid Telegram purchase of the
    /// same amount.
    pub async fn validate_pre_checkout(&self, payload: &str, total_amount: i64) -> Result<Purchase> {
        let payload: StarsPayload = payload.parse()?;
        let purchase = bounded("find_purchase", self.timeout, self.purchases.find_by_id(payload.purchase_id))
            .await?
            .ok_or(PaymentError::PurchaseNotFound(payload.purchase_id))?;

        if purchase.invoice_type != InvoiceType::Telegram {
            return Err(PaymentError::MalformedInput(format!(
                "Purchase {} was invoiced through {}",
                purchase.id, purchase.invoice_type
            )));
        }
        if purchase.is_fulfilled() {
            return Err(PaymentError::MalformedInput(format!("Purchase {} is already paid", purchase.id)));
        }
        if purchase.amount != total_amount {
            return Err(PaymentError::MalformedInput(format!(
                "Purchase {} costs {} stars, checkout total is {}",
                purchase.id, purchase.amount, total_amount
            )));
        }
        Ok(purchase)
    }
}

#[async_trait]
impl Fulfiller for PurchaseFulfiller {
    async fn fulfill(&self, purchase_id: i64, channel: InvoiceType) -> Result<FulfillmentOutcome> {
        let transition = bounded("mark_fulfilled", self.timeout, self.purchases.mark_fulfilled(purchase_id)).await?;

        let (purchase, transitioned) = match transition {
            FulfillTransition::Fulfilled(purchase) => {
                if purchase.invoice_type != channel {
                    warn!(
                        purchase_id,
                        invoiced = %purchase.invoice_type,
                        %channel,
                        "Purchase paid through a different channel than invoiced"
                    );
                }
                info!(purchase_id, %channel, customer_id = purchase.customer_id, "Purchase fulfilled");
                (purchase, true)
            }
            FulfillTransition::AlreadyFulfilled(purchase) if purchase.is_provisioned() => {
                info!(purchase_id, %channel, "Purchase already fulfilled, ignoring redelivery");
                return Ok(FulfillmentOutcome::AlreadyFulfilled(purchase));
            }
            FulfillTransition::AlreadyFulfilled(purchase) => (purchase, false),
            FulfillTransition::NotFound => {
                error!(purchase_id, %channel, "Payment completed for unknown purchase");
                return Err(PaymentError::PurchaseNotFound(purchase_id));
            }
        };

        let claimed = bounded(
            "claim_provisioning",
            self.timeout,
            self.purchases.claim_provisioning(purchase_id, self.lease),
        )
        .await?;
        if !claimed {
            debug!(purchase_id, %channel, "Provisioning held by another delivery");
            return Ok(FulfillmentOutcome::AlreadyFulfilled(purchase));
        }
        if !transitioned {
            warn!(purchase_id, %channel, "Retrying provisioning of an already fulfilled purchase");
        }

        self.provision(&purchase).await?;
        Ok(FulfillmentOutcome::Fulfilled(purchase))
    }
}
