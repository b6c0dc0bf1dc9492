//! Payment-completion notifications: verify, parse, fulfill.
//!
//! Every delivery ends in a [`WebhookOutcome`], which maps onto the HTTP status the
//! processor sees. Processors retry on non-2xx, so only storage trouble answers 500.

use serde_json::Value;
use std::sync::Arc;
use subshop_db::models::InvoiceType;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::PaymentError;
use crate::fulfillment::{Fulfiller, FulfillmentOutcome};

pub mod crypto;
pub mod signature;
pub mod stripe;

pub use crypto::CryptoPayWebhook;
pub use signature::SignatureError;
pub use stripe::StripeWebhook;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookRejection {
    #[error("signature rejected: {0}")]
    Signature(#[from] SignatureError),
    #[error("malformed body: {0}")]
    MalformedBody(String),
    #[error("purchase id missing from metadata")]
    MissingPurchaseId,
    #[error("purchase id '{0}' is not an integer")]
    InvalidPurchaseId(String),
    #[error("purchase {0} does not exist")]
    UnknownPurchase(i64),
    #[error("fulfillment failed: {0}")]
    FulfillmentFailed(String),
}

/// What a verified body asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    Completed { purchase_id: i64 },
    Ignored(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Fulfilled { purchase_id: i64 },
    AlreadyFulfilled { purchase_id: i64 },
    Ignored { reason: String },
    Rejected(WebhookRejection),
}

impl WebhookOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookOutcome::Fulfilled { .. } | WebhookOutcome::AlreadyFulfilled { .. } | WebhookOutcome::Ignored { .. } => {
                200
            }
            WebhookOutcome::Rejected(rejection) => match rejection {
                WebhookRejection::Signature(_) => 401,
                WebhookRejection::MalformedBody(_)
                | WebhookRejection::MissingPurchaseId
                | WebhookRejection::InvalidPurchaseId(_)
                | WebhookRejection::UnknownPurchase(_) => 400,
                WebhookRejection::FulfillmentFailed(_) => 500,
            },
        }
    }
}

pub trait WebhookSource: Send + Sync {
    fn channel(&self) -> InvoiceType;

    fn signature_header(&self) -> &'static str;

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError>;

    /// Only called on verified bodies.
    fn parse(&self, body: &[u8]) -> Result<ParsedEvent, WebhookRejection>;
}

/// Purchase ids travel as strings in processor metadata; bare integers are accepted too.
pub fn extract_purchase_id(value: Option<&Value>) -> Result<i64, WebhookRejection> {
    match value {
        None | Some(Value::Null) => Err(WebhookRejection::MissingPurchaseId),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| WebhookRejection::InvalidPurchaseId(s.clone())),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| WebhookRejection::InvalidPurchaseId(n.to_string())),
        Some(other) => Err(WebhookRejection::InvalidPurchaseId(other.to_string())),
    }
}

#[derive(Clone)]
pub struct WebhookPipeline {
    fulfiller: Arc<dyn Fulfiller>,
}

impl WebhookPipeline {
    pub fn new(fulfiller: Arc<dyn Fulfiller>) -> Self {
        Self { fulfiller }
    }

    pub async fn process(&self, source: &dyn WebhookSource, body: &[u8], signature: Option<&str>) -> WebhookOutcome {
        let channel = source.channel();

        if let Err(e) = source.verify(body, signature) {
            warn!(%channel, "Webhook signature rejected: {}", e);
            return WebhookOutcome::Rejected(e.into());
        }

        let event = match source.parse(body) {
            Ok(event) => event,
            Err(rejection) => {
                error!(%channel, "Webhook rejected: {}", rejection);
                return WebhookOutcome::Rejected(rejection);
            }
        };

        let purchase_id = match event {
            ParsedEvent::Completed { purchase_id } => purchase_id,
            ParsedEvent::Ignored(reason) => {
                debug!(%channel, %reason, "Webhook ignored");
                return WebhookOutcome::Ignored { reason };
            }
        };

        match self.fulfiller.fulfill(purchase_id, channel).await {
            Ok(FulfillmentOutcome::Fulfilled(_)) => {
                info!(purchase_id, %channel, "Webhook fulfilled purchase");
                WebhookOutcome::Fulfilled { purchase_id }
            }
            Ok(FulfillmentOutcome::AlreadyFulfilled(_)) => WebhookOutcome::AlreadyFulfilled { purchase_id },
            Err(PaymentError::PurchaseNotFound(id)) => WebhookOutcome::Rejected(WebhookRejection::UnknownPurchase(id)),
            Err(e) => {
                error!(purchase_id, %channel, retryable = e.is_retryable(), "Fulfillment failed: {}", e);
                WebhookOutcome::Rejected(WebhookRejection::FulfillmentFailed(e.to_string()))
            }
        }
    }
}
