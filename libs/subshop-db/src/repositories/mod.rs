//! Repository contract used by the payment core, plus its PostgreSQL implementation.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::models::{Customer, FulfillTransition, NewPurchase, Purchase};

pub mod customer_repo;
pub mod purchase_repo;

pub use customer_repo::CustomerRepository;
pub use purchase_repo::PurchaseRepository;

/// Read-only customer lookup. Customers are created by onboarding, never here.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Customer>>;
}

#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Inserts a `pending` purchase and returns it with its identifier.
    async fn create_pending(&self, purchase: NewPurchase) -> Result<Purchase>;

    async fn attach_session(&self, id: i64, session_ref: &str) -> Result<()>;

    /// Moves a `pending` purchase to `failed`. Other states are left alone.
    async fn mark_failed(&self, id: i64) -> Result<()>;

    /// Conditional transition to `fulfilled`; at most one caller ever sees
    /// [`FulfillTransition::Fulfilled`] for a given id.
    async fn mark_fulfilled(&self, id: i64) -> Result<FulfillTransition>;

    /// Takes the provisioning lease on a fulfilled, not yet provisioned purchase.
    /// `false` while another holder's lease is younger than `lease`, or once provisioned.
    async fn claim_provisioning(&self, id: i64, lease: Duration) -> Result<bool>;

    /// Records a successful fulfillment hook and drops the lease.
    async fn mark_provisioned(&self, id: i64) -> Result<()>;

    /// Drops the lease after a failed hook so the next delivery can retry.
    async fn release_provisioning(&self, id: i64) -> Result<()>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Purchase>>;

    /// Whether the customer has a fulfilled purchase paid through a direct channel.
    async fn has_fulfilled_direct_purchase(&self, customer_id: i64) -> Result<bool>;
}
