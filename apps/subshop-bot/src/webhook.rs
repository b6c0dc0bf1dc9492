use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use subshop_core::webhook::{CryptoPayWebhook, StripeWebhook, WebhookOutcome, WebhookPipeline, WebhookSource};
use tower_http::trace::TraceLayer;

/// Inbound payment notifications. A source is `None` when its secret is not configured.
#[derive(Clone)]
pub struct WebhookState {
    pub pipeline: WebhookPipeline,
    pub stripe: Option<Arc<StripeWebhook>>,
    pub crypto: Option<Arc<CryptoPayWebhook>>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/payments/stripe", post(stripe_webhook))
        .route("/api/payments/crypto", post(crypto_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn stripe_webhook(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    match state.stripe.as_deref() {
        Some(source) => deliver(&state.pipeline, source, &headers, &body).await,
        None => StatusCode::NOT_FOUND,
    }
}

async fn crypto_webhook(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    match state.crypto.as_deref() {
        Some(source) => deliver(&state.pipeline, source, &headers, &body).await,
        None => StatusCode::NOT_FOUND,
    }
}

async fn deliver(pipeline: &WebhookPipeline, source: &dyn WebhookSource, headers: &HeaderMap, body: &[u8]) -> StatusCode {
    let signature = headers
        .get(source.signature_header())
        .and_then(|v| v.to_str().ok());

    let outcome = pipeline.process(source, body, signature).await;
    if let WebhookOutcome::Rejected(reason) = &outcome {
        tracing::warn!(channel = %source.channel(), "Webhook answered with rejection: {}", reason);
    }
    StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
