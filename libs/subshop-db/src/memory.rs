//! In-memory stores implementing the repository contract, for tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::models::{Customer, FulfillTransition, NewPurchase, Purchase, PurchaseStatus};
use crate::repositories::{CustomerStore, PurchaseStore};

#[derive(Debug, Default)]
pub struct MemoryCustomerStore {
    customers: RwLock<HashMap<i64, Customer>>,
}

impl MemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a customer the way onboarding would; returns the stored record.
    pub async fn register(&self, telegram_id: i64) -> Customer {
        let mut customers = self.customers.write().await;
        if let Some(existing) = customers.values().find(|c| c.telegram_id == telegram_id) {
            return existing.clone();
        }
        let customer = Customer {
            id: customers.len() as i64 + 1,
            telegram_id,
            language: None,
            created_at: Utc::now(),
        };
        customers.insert(customer.id, customer.clone());
        customer
    }
}

#[async_trait]
impl CustomerStore for MemoryCustomerStore {
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.values().find(|c| c.telegram_id == telegram_id).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Customer>> {
        Ok(self.customers.read().await.get(&id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemoryPurchaseStore {
    purchases: RwLock<HashMap<i64, Purchase>>,
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Purchase> {
        let mut all: Vec<Purchase> = self.purchases.read().await.values().cloned().collect();
        all.sort_by_key(|p| p.id);
        all
    }
}

#[async_trait]
impl PurchaseStore for MemoryPurchaseStore {
    async fn create_pending(&self, purchase: NewPurchase) -> Result<Purchase> {
        let mut purchases = self.purchases.write().await;
        let record = Purchase {
            id: purchases.len() as i64 + 1,
            customer_id: purchase.customer_id,
            plan_months: purchase.plan_months,
            amount: purchase.amount,
            currency: purchase.currency,
            invoice_type: purchase.invoice_type,
            external_session_ref: None,
            status: PurchaseStatus::Pending,
            created_at: Utc::now(),
            paid_at: None,
            provisioned_at: None,
            provisioning_claimed_at: None,
        };
        purchases.insert(record.id, record.clone());
        Ok(record)
    }

    async fn attach_session(&self, id: i64, session_ref: &str) -> Result<()> {
        if let Some(p) = self.purchases.write().await.get_mut(&id) {
            p.external_session_ref = Some(session_ref.to_string());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64) -> Result<()> {
        if let Some(p) = self.purchases.write().await.get_mut(&id) {
            if p.status == PurchaseStatus::Pending {
                p.status = PurchaseStatus::Failed;
            }
        }
        Ok(())
    }

    async fn mark_fulfilled(&self, id: i64) -> Result<FulfillTransition> {
        // Holding the write guard for the whole check-and-set keeps it atomic.
        let mut purchases = self.purchases.write().await;
        let Some(p) = purchases.get_mut(&id) else {
            return Ok(FulfillTransition::NotFound);
        };
        if p.status == PurchaseStatus::Fulfilled {
            return Ok(FulfillTransition::AlreadyFulfilled(p.clone()));
        }
        p.status = PurchaseStatus::Fulfilled;
        p.paid_at = Some(Utc::now());
        Ok(FulfillTransition::Fulfilled(p.clone()))
    }

    async fn claim_provisioning(&self, id: i64, lease: Duration) -> Result<bool> {
        let mut purchases = self.purchases.write().await;
        let Some(p) = purchases.get_mut(&id) else {
            return Ok(false);
        };
        if !p.is_fulfilled() || p.is_provisioned() {
            return Ok(false);
        }
        let now = Utc::now();
        let lease_expired = match p.provisioning_claimed_at {
            None => true,
            Some(claimed) => now.signed_duration_since(claimed).to_std().is_ok_and(|age| age >= lease),
        };
        if lease_expired {
            p.provisioning_claimed_at = Some(now);
        }
        Ok(lease_expired)
    }

    async fn mark_provisioned(&self, id: i64) -> Result<()> {
        if let Some(p) = self.purchases.write().await.get_mut(&id) {
            p.provisioned_at = Some(Utc::now());
            p.provisioning_claimed_at = None;
        }
        Ok(())
    }

    async fn release_provisioning(&self, id: i64) -> Result<()> {
        if let Some(p) = self.purchases.write().await.get_mut(&id) {
            if !p.is_provisioned() {
                p.provisioning_claimed_at = None;
            }
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Purchase>> {
        Ok(self.purchases.read().await.get(&id).cloned())
    }

    async fn has_fulfilled_direct_purchase(&self, customer_id: i64) -> Result<bool> {
        let purchases = self.purchases.read().await;
        Ok(purchases.values().any(|p| {
            p.customer_id == customer_id && p.is_fulfilled() && p.invoice_type.is_direct()
        }))
    }
}
