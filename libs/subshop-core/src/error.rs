//! Payment error types

use std::time::Duration;
use subshop_db::models::InvoiceType;
use thiserror::Error;

use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// Callback or payment payload that cannot be trusted.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Customer with telegram id {0} not found")]
    CustomerNotFound(i64),

    #[error("Purchase {0} not found")]
    PurchaseNotFound(i64),

    #[error("No price configured for {months} month(s)")]
    PlanNotOffered { months: u32 },

    #[error("Payment channel {0} is not available")]
    ChannelUnavailable(String),

    #[error("{channel} processor error: {message}")]
    Processor { channel: InvoiceType, message: String },

    /// The fulfillment hook failed; the purchase stays fulfilled and is retried on redelivery.
    #[error("Provisioning of purchase {purchase_id} failed: {message}")]
    Provisioning { purchase_id: i64, message: String },

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl PaymentError {
    pub fn processor(channel: InvoiceType, message: impl Into<String>) -> Self {
        PaymentError::Processor {
            channel,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::Processor { .. }
                | PaymentError::Provisioning { .. }
                | PaymentError::Storage(_)
                | PaymentError::Timeout { .. }
        )
    }

    /// Text safe to show to the customer; never includes internal details.
    pub fn user_message(&self) -> &'static str {
        match self {
            PaymentError::MalformedInput(_) | PaymentError::Token(_) => {
                "This button is no longer valid. Please open the menu again."
            }
            PaymentError::CustomerNotFound(_) => "Please press /start first.",
            PaymentError::PlanNotOffered { .. } => "This plan is not available right now.",
            PaymentError::ChannelUnavailable(_) => "This payment method is not available right now.",
            PaymentError::Processor { .. } | PaymentError::Timeout { .. } => {
                "Payment processing failed. Please try again."
            }
            PaymentError::PurchaseNotFound(_) | PaymentError::Provisioning { .. } | PaymentError::Storage(_) => {
                "An error occurred processing your request."
            }
        }
    }
}
