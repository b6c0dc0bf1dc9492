use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::Customer;
use crate::repositories::CustomerStore;

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerStore for CustomerRepository {
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch customer by telegram id")
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Customer>> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch customer by ID")
    }
}
