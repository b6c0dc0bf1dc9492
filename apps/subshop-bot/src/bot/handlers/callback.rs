use subshop_core::cache::CachedMessage;
use subshop_core::{Action, CallbackContext, CallbackToken, FlowOutcome, PaymentError};
use subshop_core::menu::Menu;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardMarkup, MessageId, ParseMode};
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::bot::handlers::command::WELCOME_TEXT;
use crate::bot::keyboards::{label, render_menu, start_keyboard};

pub fn context_of(q: &CallbackQuery) -> CallbackContext {
    CallbackContext {
        telegram_id: q.from.id.0 as i64,
        username: q.from.username.clone(),
        language: q.from.language_code.clone(),
    }
}

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    debug!("Received callback: {:?}", q.data);
    let ctx = context_of(&q);
    let data = q.data.as_deref().unwrap_or_default();

    let outcome = match CallbackToken::decode(data) {
        Ok(token) => state.flow.handle(&ctx, &token).await,
        Err(e) => Err(PaymentError::from(e)),
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(telegram_id = ctx.telegram_id, data, "Callback failed: {}", e);
            bot.answer_callback_query(q.id.clone())
                .text(e.user_message())
                .show_alert(true)
                .await?;
            return Ok(());
        }
    };
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(msg) = q.message.as_ref() else {
        return Ok(());
    };
    let (chat_id, message_id) = (msg.chat().id, msg.id());

    match outcome {
        FlowOutcome::Render(menu) => show_menu(&bot, chat_id, message_id, &menu).await,
        FlowOutcome::Invoice { menu, purchase_id } => {
            show_menu(&bot, chat_id, message_id, &menu).await;
            state
                .cache
                .set(
                    purchase_id,
                    CachedMessage {
                        chat_id: chat_id.0,
                        message_id: message_id.0,
                    },
                )
                .await;
            info!(purchase_id, telegram_id = ctx.telegram_id, "Pay link shown");
        }
        FlowOutcome::Delegated(Action::Start) => {
            edit(&bot, chat_id, message_id, Some(WELCOME_TEXT.to_string()), start_keyboard()).await;
        }
        FlowOutcome::Delegated(action) => {
            info!(%action, "Callback has no handler in this bot");
        }
    }
    Ok(())
}

async fn show_menu(bot: &Bot, chat_id: ChatId, message_id: MessageId, menu: &Menu) {
    match render_menu(menu) {
        Ok(markup) => edit(bot, chat_id, message_id, menu.text.map(label), markup).await,
        Err(e) => error!("Failed to render menu: {}", e),
    }
}

/// Replaces the text when given, otherwise only the keyboard.
async fn edit(bot: &Bot, chat_id: ChatId, message_id: MessageId, text: Option<String>, markup: InlineKeyboardMarkup) {
    let res = match text {
        Some(text) => bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(markup)
            .await
            .map(|_| ()),
        None => bot
            .edit_message_reply_markup(chat_id, message_id)
            .reply_markup(markup)
            .await
            .map(|_| ()),
    };
    if let Err(e) = res {
        error!("Failed to update menu message: {}", e);
    }
}
