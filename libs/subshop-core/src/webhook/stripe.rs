use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use subshop_db::models::InvoiceType;

use super::signature::{STRIPE_TOLERANCE, SignatureError, verify_stripe_signature};
use super::{ParsedEvent, WebhookRejection, WebhookSource, extract_purchase_id};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventObject {
    payment_status: Option<String>,
    metadata: Option<HashMap<String, Value>>,
}

pub struct StripeWebhook {
    secret: String,
    tolerance: Duration,
}

impl fmt::Debug for StripeWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeWebhook")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl StripeWebhook {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: STRIPE_TOLERANCE,
        }
    }
}

impl WebhookSource for StripeWebhook {
    fn channel(&self) -> InvoiceType {
        InvoiceType::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        verify_stripe_signature(body, signature, &self.secret, Utc::now().timestamp(), self.tolerance)
    }

    fn parse(&self, body: &[u8]) -> Result<ParsedEvent, WebhookRejection> {
        let event: StripeEvent =
            serde_json::from_slice(body).map_err(|e| WebhookRejection::MalformedBody(e.to_string()))?;

        if event.event_type != CHECKOUT_COMPLETED {
            return Ok(ParsedEvent::Ignored(format!("event type {}", event.event_type)));
        }
        let object = event.data.object;
        if object.payment_status.as_deref() != Some("paid") {
            return Ok(ParsedEvent::Ignored(format!(
                "payment status {}",
                object.payment_status.as_deref().unwrap_or("missing")
            )));
        }

        let purchase_id = extract_purchase_id(object.metadata.as_ref().and_then(|m| m.get("purchase_id")))?;
        Ok(ParsedEvent::Completed { purchase_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(event_type: &str, payment_status: &str, metadata: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": { "id": "cs_1", "payment_status": payment_status, "metadata": metadata } }
        }))
        .unwrap()
    }

    #[test]
    fn paid_checkout_is_actionable() {
        let hook = StripeWebhook::new("whsec");
        assert_eq!(
            hook.parse(&body(CHECKOUT_COMPLETED, "paid", json!({ "purchase_id": "42" }))),
            Ok(ParsedEvent::Completed { purchase_id: 42 })
        );
    }

    #[test]
    fn other_events_and_unpaid_sessions_are_ignored() {
        let hook = StripeWebhook::new("whsec");
        assert!(matches!(
            hook.parse(&body("payment_intent.created", "paid", json!({}))),
            Ok(ParsedEvent::Ignored(_))
        ));
        assert!(matches!(
            hook.parse(&body(CHECKOUT_COMPLETED, "unpaid", json!({ "purchase_id": "42" }))),
            Ok(ParsedEvent::Ignored(_))
        ));
    }

    #[test]
    fn bad_metadata_is_rejected() {
        let hook = StripeWebhook::new("whsec");
        assert_eq!(
            hook.parse(&body(CHECKOUT_COMPLETED, "paid", json!({}))),
            Err(WebhookRejection::MissingPurchaseId)
        );
        assert_eq!(
            hook.parse(&body(CHECKOUT_COMPLETED, "paid", Value::Null)),
            Err(WebhookRejection::MissingPurchaseId)
        );
        assert_eq!(
            hook.parse(&body(CHECKOUT_COMPLETED, "paid", json!({ "purchase_id": "abc" }))),
            Err(WebhookRejection::InvalidPurchaseId("abc".into()))
        );
        assert!(matches!(hook.parse(b"not json"), Err(WebhookRejection::MalformedBody(_))));
        assert!(matches!(hook.parse(b"{\"type\":1}"), Err(WebhookRejection::MalformedBody(_))));
    }
}
