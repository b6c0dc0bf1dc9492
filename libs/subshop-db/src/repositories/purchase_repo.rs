use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

use crate::models::purchase::PurchaseRow;
use crate::models::{FulfillTransition, InvoiceType, NewPurchase, Purchase, PurchaseStatus};
use crate::repositories::PurchaseStore;

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: PgPool,
}

impl PurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: PurchaseRow) -> Result<Purchase> {
        let id = row.id;
        Purchase::try_from(row).with_context(|| format!("Corrupt purchase row {}", id))
    }
}

#[async_trait]
impl PurchaseStore for PurchaseRepository {
    async fn create_pending(&self, purchase: NewPurchase) -> Result<Purchase> {
        let row = sqlx::query_as::<_, PurchaseRow>(
            r#"
            INSERT INTO purchases (customer_id, plan_months, amount, currency, invoice_type, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, CURRENT_TIMESTAMP)
            RETURNING *
            "#,
        )
        .bind(purchase.customer_id)
        .bind(purchase.plan_months)
        .bind(purchase.amount)
        .bind(&purchase.currency)
        .bind(purchase.invoice_type.as_str())
        .bind(PurchaseStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create purchase")?;

        Self::decode(row)
    }

    async fn attach_session(&self, id: i64, session_ref: &str) -> Result<()> {
        sqlx::query("UPDATE purchases SET external_session_ref = $1 WHERE id = $2")
            .bind(session_ref)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to attach session to purchase")?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE purchases SET status = 'failed' WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to mark purchase as failed")?;
        Ok(())
    }

    async fn mark_fulfilled(&self, id: i64) -> Result<FulfillTransition> {
        // The row lock taken by UPDATE serialises concurrent deliveries across instances.
        let updated = sqlx::query_as::<_, PurchaseRow>(
            "UPDATE purchases SET status = 'fulfilled', paid_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status <> 'fulfilled'
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to mark purchase as fulfilled")?;

        if let Some(row) = updated {
            return Ok(FulfillTransition::Fulfilled(Self::decode(row)?));
        }

        debug!(purchase_id = id, "Conditional fulfill matched no row");
        match self.find_by_id(id).await? {
            Some(existing) => Ok(FulfillTransition::AlreadyFulfilled(existing)),
            None => Ok(FulfillTransition::NotFound),
        }
    }

    async fn claim_provisioning(&self, id: i64, lease: Duration) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE purchases SET provisioning_claimed_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND status = 'fulfilled' AND provisioned_at IS NULL
               AND (provisioning_claimed_at IS NULL
                    OR provisioning_claimed_at <= CURRENT_TIMESTAMP - make_interval(secs => $2))",
        )
        .bind(id)
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await
        .context("Failed to claim purchase provisioning")?;
        Ok(res.rows_affected() == 1)
    }

    async fn mark_provisioned(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE purchases SET provisioned_at = CURRENT_TIMESTAMP, provisioning_claimed_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark purchase as provisioned")?;
        Ok(())
    }

    async fn release_provisioning(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE purchases SET provisioning_claimed_at = NULL WHERE id = $1 AND provisioned_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to release purchase provisioning")?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Purchase>> {
        let row = sqlx::query_as::<_, PurchaseRow>("SELECT * FROM purchases WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch purchase by ID")?;

        row.map(Self::decode).transpose()
    }

    async fn has_fulfilled_direct_purchase(&self, customer_id: i64) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM purchases WHERE customer_id = $1 AND status = 'fulfilled' AND invoice_type <> $2)",
        )
        .bind(customer_id)
        .bind(InvoiceType::Telegram.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to check paid purchase history")
    }
}
