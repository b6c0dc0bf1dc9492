//! Which payment methods a customer may see, and how the chooser is laid out.
//!
//! [`Eligibility::evaluate`] is a pure function of the configuration and the customer's
//! purchase history. [`MenuPolicy`] resolves that history from storage and fails closed:
//! if the lookup breaks, the customer is treated as having no paid history.

use std::sync::Arc;
use subshop_db::models::InvoiceType;
use subshop_db::repositories::{CustomerStore, PurchaseStore};
use tracing::{debug, warn};

use crate::config::PaymentConfig;
use crate::deadline::bounded;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurchaseHistory {
    pub has_fulfilled_direct_purchase: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuLayout {
    /// Stars first, then a "direct payment" sub-menu.
    TwoStep,
    /// All eligible methods side by side.
    Flat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub stars: bool,
    pub stripe: bool,
    pub crypto: bool,
}

impl Eligibility {
    pub fn evaluate(config: &PaymentConfig, history: &PurchaseHistory) -> Self {
        Self {
            stars: config.stars_enabled
                && (!config.require_paid_purchase_for_stars || history.has_fulfilled_direct_purchase),
            stripe: config.stripe_enabled,
            crypto: config.crypto_enabled,
        }
    }

    pub fn allows(&self, channel: InvoiceType) -> bool {
        match channel {
            InvoiceType::Telegram => self.stars,
            InvoiceType::Stripe => self.stripe,
            InvoiceType::Crypto => self.crypto,
        }
    }

    pub fn has_direct(&self) -> bool {
        self.stripe || self.crypto
    }

    pub fn layout(&self) -> MenuLayout {
        if self.stars && self.has_direct() {
            MenuLayout::TwoStep
        } else {
            MenuLayout::Flat
        }
    }

    /// Flat chooser order: crypto, stripe, stars.
    pub fn method_buttons(&self) -> Vec<InvoiceType> {
        [InvoiceType::Crypto, InvoiceType::Stripe, InvoiceType::Telegram]
            .into_iter()
            .filter(|c| self.allows(*c))
            .collect()
    }

    /// Direct sub-menu order: stripe, crypto.
    pub fn direct_buttons(&self) -> Vec<InvoiceType> {
        [InvoiceType::Stripe, InvoiceType::Crypto]
            .into_iter()
            .filter(|c| self.allows(*c))
            .collect()
    }

    pub fn first_direct(&self) -> Option<InvoiceType> {
        self.direct_buttons().into_iter().next()
    }
}

#[derive(Clone)]
pub struct MenuPolicy {
    config: Arc<PaymentConfig>,
    customers: Arc<dyn CustomerStore>,
    purchases: Arc<dyn PurchaseStore>,
}

impl MenuPolicy {
    pub fn new(
        config: Arc<PaymentConfig>,
        customers: Arc<dyn CustomerStore>,
        purchases: Arc<dyn PurchaseStore>,
    ) -> Self {
        Self {
            config,
            customers,
            purchases,
        }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    pub async fn eligibility(&self, telegram_id: i64) -> Eligibility {
        let history = self.history(telegram_id).await;
        Eligibility::evaluate(&self.config, &history)
    }

    /// Storage is only consulted when gating can change the answer.
    pub async fn history(&self, telegram_id: i64) -> PurchaseHistory {
        if !self.config.stars_enabled || !self.config.require_paid_purchase_for_stars {
            return PurchaseHistory::default();
        }

        let limit = self.config.external_timeout();
        let customer = match bounded(
            "find_customer",
            limit,
            self.customers.find_by_telegram_id(telegram_id),
        )
        .await
        {
            Ok(Some(customer)) => customer,
            Ok(None) => {
                debug!(telegram_id, "No customer record, Stars stays gated");
                return PurchaseHistory::default();
            }
            Err(e) => {
                warn!(telegram_id, error = %e, "Customer lookup failed, hiding Stars");
                return PurchaseHistory::default();
            }
        };

        match bounded(
            "paid_purchase_history",
            limit,
            self.purchases.has_fulfilled_direct_purchase(customer.id),
        )
        .await
        {
            Ok(has_fulfilled_direct_purchase) => PurchaseHistory {
                has_fulfilled_direct_purchase,
            },
            Err(e) => {
                warn!(telegram_id, customer_id = customer.id, error = %e, "Purchase history lookup failed, hiding Stars");
                PurchaseHistory::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(stars: bool, stripe: bool, crypto: bool, gated: bool) -> PaymentConfig {
        PaymentConfig {
            stars_enabled: stars,
            stripe_enabled: stripe,
            crypto_enabled: crypto,
            require_paid_purchase_for_stars: gated,
            ..Default::default()
        }
    }

    #[test]
    fn single_direct_channel_with_stars_is_two_step() {
        let e = Eligibility::evaluate(&config(true, false, true, false), &PurchaseHistory::default());
        assert_eq!(e.layout(), MenuLayout::TwoStep);
        assert_eq!(e.direct_buttons(), vec![InvoiceType::Crypto]);
    }

    #[test]
    fn flat_order_is_crypto_stripe_stars() {
        let e = Eligibility {
            stars: true,
            stripe: true,
            crypto: true,
        };
        assert_eq!(
            e.method_buttons(),
            vec![InvoiceType::Crypto, InvoiceType::Stripe, InvoiceType::Telegram]
        );
        assert_eq!(e.direct_buttons(), vec![InvoiceType::Stripe, InvoiceType::Crypto]);
        assert_eq!(e.first_direct(), Some(InvoiceType::Stripe));
    }

    #[test]
    fn gated_stars_needs_direct_history() {
        let cfg = config(true, true, false, true);
        let fresh = Eligibility::evaluate(&cfg, &PurchaseHistory::default());
        assert!(!fresh.stars);
        assert_eq!(fresh.layout(), MenuLayout::Flat);

        let returning = Eligibility::evaluate(
            &cfg,
            &PurchaseHistory {
                has_fulfilled_direct_purchase: true,
            },
        );
        assert!(returning.stars);
        assert_eq!(returning.layout(), MenuLayout::TwoStep);
    }

    #[test]
    fn nothing_enabled_is_valid() {
        let e = Eligibility::evaluate(&config(false, false, false, false), &PurchaseHistory::default());
        assert!(e.method_buttons().is_empty());
        assert_eq!(e.first_direct(), None);
        assert_eq!(e.layout(), MenuLayout::Flat);
    }
}
