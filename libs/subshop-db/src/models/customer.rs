use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A chat-platform user known to the shop. Created by onboarding, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: i64,
    pub telegram_id: i64,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
}
