use subshop_core::fulfillment::{Fulfiller, FulfillmentOutcome, StarsPayload};
use subshop_db::models::InvoiceType;
use teloxide::prelude::*;
use teloxide::types::{PreCheckoutQuery, SuccessfulPayment};
use tracing::{error, info, warn};

use crate::AppState;

/// Telegram asks before charging; only a known, unpaid Stars purchase of the same
/// amount is accepted.
pub async fn pre_checkout_handler(
    bot: Bot,
    q: PreCheckoutQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    match state
        .fulfiller
        .validate_pre_checkout(&q.invoice_payload, q.total_amount as i64)
        .await
    {
        Ok(purchase) => {
            info!(purchase_id = purchase.id, "Pre-checkout accepted");
            bot.answer_pre_checkout_query(q.id, true).await?;
        }
        Err(e) => {
            warn!(payload = %q.invoice_payload, "Pre-checkout rejected: {}", e);
            bot.answer_pre_checkout_query(q.id, false)
                .error_message(e.user_message())
                .await?;
        }
    }
    Ok(())
}

pub async fn successful_payment_handler(
    bot: &Bot,
    msg: &Message,
    payment: &SuccessfulPayment,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    info!(
        "Processing Stars payment: {} XTR (charge {:?})",
        payment.total_amount, payment.telegram_payment_charge_id
    );

    let payload: StarsPayload = match payment.invoice_payload.parse() {
        Ok(payload) => payload,
        Err(e) => {
            error!(payload = %payment.invoice_payload, "Unreadable Stars payload: {}", e);
            bot.send_message(msg.chat.id, "❌ Error processing payment. Please contact support.")
                .await?;
            return Ok(());
        }
    };

    match state.fulfiller.fulfill(payload.purchase_id, InvoiceType::Telegram).await {
        Ok(FulfillmentOutcome::Fulfilled(_)) => {
            info!(purchase_id = payload.purchase_id, username = %payload.username, "Stars purchase fulfilled");
        }
        Ok(FulfillmentOutcome::AlreadyFulfilled(_)) => {
            info!(purchase_id = payload.purchase_id, "Stars payment redelivered");
        }
        Err(e) => {
            error!(purchase_id = payload.purchase_id, "Stars fulfillment failed: {}", e);
            bot.send_message(msg.chat.id, "❌ Error processing payment. Please contact support.")
                .await?;
        }
    }
    Ok(())
}
