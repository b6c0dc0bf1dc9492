use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Payment channel a purchase was invoiced through.
///
/// The lowercase names are used both in callback tokens and in the `invoice_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    /// In-chat digital goods (Telegram Stars).
    Telegram,
    /// Card checkout.
    Stripe,
    /// Crypto checkout.
    Crypto,
}

impl InvoiceType {
    pub const ALL: [InvoiceType; 3] = [InvoiceType::Telegram, InvoiceType::Stripe, InvoiceType::Crypto];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Telegram => "telegram",
            InvoiceType::Stripe => "stripe",
            InvoiceType::Crypto => "crypto",
        }
    }

    /// Direct methods redirect to an external checkout page.
    pub fn is_direct(&self) -> bool {
        !matches!(self, InvoiceType::Telegram)
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for InvoiceType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(InvoiceType::Telegram),
            "stripe" => Ok(InvoiceType::Stripe),
            "crypto" => Ok(InvoiceType::Crypto),
            other => Err(ParseEnumError {
                kind: "invoice type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Fulfilled,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Fulfilled => "fulfilled",
            PurchaseStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "fulfilled" => Ok(PurchaseStatus::Fulfilled),
            "failed" => Ok(PurchaseStatus::Failed),
            other => Err(ParseEnumError {
                kind: "purchase status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub customer_id: i64,
    pub plan_months: i32,
    /// Minor currency units; star count for Telegram purchases.
    pub amount: i64,
    pub currency: String,
    pub invoice_type: InvoiceType,
    pub external_session_ref: Option<String>,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Set once the fulfillment hook has succeeded.
    pub provisioned_at: Option<DateTime<Utc>>,
    /// Lease held by the delivery currently running the fulfillment hook.
    pub provisioning_claimed_at: Option<DateTime<Utc>>,
}

impl Purchase {
    pub fn is_fulfilled(&self) -> bool {
        self.status == PurchaseStatus::Fulfilled
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned_at.is_some()
    }
}

/// Raw `purchases` row; enum columns are stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct PurchaseRow {
    pub id: i64,
    pub customer_id: i64,
    pub plan_months: i32,
    pub amount: i64,
    pub currency: String,
    pub invoice_type: String,
    pub external_session_ref: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub provisioning_claimed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = ParseEnumError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        Ok(Purchase {
            id: row.id,
            customer_id: row.customer_id,
            plan_months: row.plan_months,
            amount: row.amount,
            currency: row.currency,
            invoice_type: row.invoice_type.parse()?,
            external_session_ref: row.external_session_ref,
            status: row.status.parse()?,
            created_at: row.created_at,
            paid_at: row.paid_at,
            provisioned_at: row.provisioned_at,
            provisioning_claimed_at: row.provisioning_claimed_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchase {
    pub customer_id: i64,
    pub plan_months: i32,
    pub amount: i64,
    pub currency: String,
    pub invoice_type: InvoiceType,
}

/// Result of the conditional `pending -> fulfilled` update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillTransition {
    /// This call moved the purchase to `fulfilled`.
    Fulfilled(Purchase),
    /// Some earlier call already did.
    AlreadyFulfilled(Purchase),
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_type_round_trips_through_its_wire_name() {
        for ty in InvoiceType::ALL {
            assert_eq!(ty.as_str().parse::<InvoiceType>(), Ok(ty));
        }
        assert!("card".parse::<InvoiceType>().is_err());
    }

    #[test]
    fn only_telegram_is_not_direct() {
        assert!(!InvoiceType::Telegram.is_direct());
        assert!(InvoiceType::Stripe.is_direct());
        assert!(InvoiceType::Crypto.is_direct());
    }

    #[test]
    fn row_with_unknown_status_is_rejected() {
        let row = PurchaseRow {
            id: 1,
            customer_id: 2,
            plan_months: 3,
            amount: 500,
            currency: "usd".into(),
            invoice_type: "stripe".into(),
            external_session_ref: None,
            status: "refunded".into(),
            created_at: Utc::now(),
            paid_at: None,
            provisioned_at: None,
            provisioning_claimed_at: None,
        };
        let err = Purchase::try_from(row).unwrap_err();
        assert_eq!(err.kind, "purchase status");
    }
}
