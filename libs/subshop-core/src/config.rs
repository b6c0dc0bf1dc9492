use serde::{Deserialize, Serialize};
use std::time::Duration;
use subshop_db::models::InvoiceType;

/// Plan lengths the shop can offer, in menu order.
pub const PLAN_MONTHS: [u32; 4] = [1, 3, 6, 12];

/// Price per plan length. Zero means the tier is not offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub month_1: i64,
    pub month_3: i64,
    pub month_6: i64,
    pub month_12: i64,
}

impl PriceTable {
    pub fn get(&self, months: u32) -> Option<i64> {
        let price = match months {
            1 => self.month_1,
            3 => self.month_3,
            6 => self.month_6,
            12 => self.month_12,
            _ => 0,
        };
        (price > 0).then_some(price)
    }

    /// Offered tiers, shortest first.
    pub fn tiers(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        PLAN_MONTHS
            .into_iter()
            .filter_map(|m| self.get(m).map(|price| (m, price)))
    }
}

/// Everything menu and pricing decisions depend on. Passed explicitly, never read
/// from process globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub stars_enabled: bool,
    pub stripe_enabled: bool,
    pub crypto_enabled: bool,
    /// Offer Stars only to customers with a fulfilled direct-channel purchase.
    pub require_paid_purchase_for_stars: bool,
    /// Default table: crypto, and anything without a dedicated table.
    pub prices: PriceTable,
    /// Card prices; falls back to `prices` when unset.
    pub stripe_prices: Option<PriceTable>,
    /// Star counts.
    pub stars_prices: PriceTable,
    pub currency: String,
    pub external_timeout_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stars_enabled: false,
            stripe_enabled: false,
            crypto_enabled: false,
            require_paid_purchase_for_stars: false,
            prices: PriceTable::default(),
            stripe_prices: None,
            stars_prices: PriceTable::default(),
            currency: "usd".to_string(),
            external_timeout_secs: 10,
        }
    }
}

impl PaymentConfig {
    pub fn has_direct_methods(&self) -> bool {
        self.stripe_enabled || self.crypto_enabled
    }

    pub fn table_for(&self, channel: Option<InvoiceType>) -> &PriceTable {
        match channel {
            Some(InvoiceType::Telegram) => &self.stars_prices,
            Some(InvoiceType::Stripe) => self.stripe_prices.as_ref().unwrap_or(&self.prices),
            Some(InvoiceType::Crypto) | None => &self.prices,
        }
    }

    /// Authoritative price for a plan on a channel; `None` when the tier is not offered.
    pub fn price_for(&self, channel: Option<InvoiceType>, months: u32) -> Option<i64> {
        self.table_for(channel).get(months)
    }

    pub fn currency_for(&self, channel: InvoiceType) -> &str {
        match channel {
            InvoiceType::Telegram => "XTR",
            InvoiceType::Stripe | InvoiceType::Crypto => &self.currency,
        }
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs.max(1))
    }
}
