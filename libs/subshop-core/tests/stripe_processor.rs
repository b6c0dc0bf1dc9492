//! Stripe processor against a local server standing in for the Stripe API.

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use subshop_core::fulfillment::{NoopHook, PurchaseFulfiller};
use subshop_core::orchestrator::{PaymentOrchestrator, SessionRequest};
use subshop_core::processor::{PaymentProcessor, SessionParams, StripeProcessor, StripeSettings, http_client};
use subshop_core::webhook::signature::stripe_signature_header;
use subshop_core::webhook::{StripeWebhook, WebhookOutcome, WebhookPipeline};
use subshop_core::{PaymentConfig, PaymentError, PriceTable};
use subshop_db::memory::{MemoryCustomerStore, MemoryPurchaseStore};
use subshop_db::models::{InvoiceType, PurchaseStatus};
use subshop_db::repositories::PurchaseStore;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct MockStripe {
    requests: Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>>,
    decline: bool,
}

async fn create_session(
    State(mock): State<MockStripe>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let purchase_id = form.get("metadata[purchase_id]").cloned().unwrap_or_default();
    mock.requests.lock().await.push((auth, form));

    if mock.decline {
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({ "error": { "message": "Your card was declined." } })),
        )
            .into_response();
    }
    Json(json!({
        "id": format!("cs_test_{}", purchase_id),
        "url": format!("https://checkout.stripe.test/pay/{}", purchase_id)
    }))
    .into_response()
}

async fn spawn_mock(mock: MockStripe) -> String {
    let app = Router::new()
        .route("/v1/checkout/sessions", post(create_session))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn settings() -> StripeSettings {
    StripeSettings {
        secret_key: "sk_test_local".into(),
        webhook_secret: "whsec_local".into(),
        success_url: "https://t.me/shop_bot".into(),
        cancel_url: "https://t.me/shop_bot".into(),
    }
}

fn processor(base: &str) -> StripeProcessor {
    StripeProcessor::new(http_client(Duration::from_secs(5)).unwrap(), settings()).with_api_base(base)
}

fn params(purchase_id: i64) -> SessionParams {
    SessionParams {
        purchase_id,
        telegram_id: 10,
        username: Some("alice".into()),
        months: 1,
        amount: 300,
        currency: "usd".into(),
    }
}

#[tokio::test]
async fn session_request_is_tagged_and_authenticated() {
    let mock = MockStripe::default();
    let base = spawn_mock(mock.clone()).await;

    let session = processor(&base).create_session(&params(42)).await.unwrap();
    assert_eq!(session.session_ref, "cs_test_42");
    assert_eq!(session.pay_url, "https://checkout.stripe.test/pay/42");

    let requests = mock.requests.lock().await;
    let (auth, form) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk_test_local"));
    assert_eq!(form["mode"], "payment");
    assert_eq!(form["metadata[purchase_id]"], "42");
    assert_eq!(form["line_items[0][price_data][unit_amount]"], "300");
    assert_eq!(form["line_items[0][quantity]"], "1");
    assert_eq!(form["success_url"], "https://t.me/shop_bot");
}

#[tokio::test]
async fn declined_session_surfaces_stripe_message() {
    let mock = MockStripe {
        decline: true,
        ..Default::default()
    };
    let base = spawn_mock(mock).await;

    let err = processor(&base).create_session(&params(7)).await.unwrap_err();
    match err {
        PaymentError::Processor { channel, message } => {
            assert_eq!(channel, InvoiceType::Stripe);
            assert_eq!(message, "Your card was declined.");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_api_is_a_processor_error() {
    let err = processor("http://127.0.0.1:9").create_session(&params(1)).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn metadata_round_trips_into_fulfillment() {
    let mock = MockStripe::default();
    let base = spawn_mock(mock.clone()).await;

    let customers = Arc::new(MemoryCustomerStore::new());
    customers.register(10).await;
    let purchases = Arc::new(MemoryPurchaseStore::new());
    let config = Arc::new(PaymentConfig {
        stripe_enabled: true,
        prices: PriceTable {
            month_1: 300,
            ..Default::default()
        },
        ..Default::default()
    });
    let orchestrator = PaymentOrchestrator::new(config, customers, purchases.clone())
        .with_processor(Arc::new(processor(&base)));

    let session = orchestrator
        .create_session(&SessionRequest::new(10, Some("alice".into()), 1, InvoiceType::Stripe))
        .await
        .unwrap();
    let stored = purchases.find_by_id(session.purchase_id).await.unwrap().unwrap();
    assert_eq!(stored.external_session_ref, Some(format!("cs_test_{}", session.purchase_id)));

    let tagged = mock.requests.lock().await[0].1["metadata[purchase_id]"].clone();
    let body = serde_json::to_vec(&json!({
        "type": "checkout.session.completed",
        "data": { "object": { "payment_status": "paid", "metadata": { "purchase_id": tagged } } }
    }))
    .unwrap();
    let header = stripe_signature_header("whsec_local", Utc::now().timestamp(), &body).unwrap();

    let fulfiller = PurchaseFulfiller::new(purchases.clone(), Arc::new(NoopHook), Duration::from_secs(5));
    let pipeline = WebhookPipeline::new(Arc::new(fulfiller));
    let outcome = pipeline
        .process(&StripeWebhook::new("whsec_local"), &body, Some(&header))
        .await;

    assert_eq!(
        outcome,
        WebhookOutcome::Fulfilled {
            purchase_id: session.purchase_id
        }
    );
    assert_eq!(
        purchases.find_by_id(session.purchase_id).await.unwrap().unwrap().status,
        PurchaseStatus::Fulfilled
    );
}
