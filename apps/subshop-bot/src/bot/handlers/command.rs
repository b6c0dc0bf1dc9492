use subshop_core::menu::LabelKey;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{error, info};

use crate::AppState;
use crate::bot::handlers::payment::successful_payment_handler;
use crate::bot::keyboards::{label, render_menu, start_keyboard};

pub const WELCOME_TEXT: &str = "👋 <b>Welcome!</b>\n\nPick a subscription plan to get started.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Buy,
}

impl Command {
    /// `/start`, `/buy` and their `@botname` forms; arguments are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?.split('@').next()?;
        match name {
            "start" => Some(Command::Start),
            "buy" => Some(Command::Buy),
            _ => None,
        }
    }
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    if let Some(payment) = msg.successful_payment() {
        return successful_payment_handler(&bot, &msg, payment, &state).await;
    }

    let Some(command) = msg.text().and_then(Command::parse) else {
        return Ok(());
    };
    info!(chat_id = msg.chat.id.0, ?command, "Received command");

    match command {
        Command::Start => {
            bot.send_message(msg.chat.id, WELCOME_TEXT)
                .parse_mode(ParseMode::Html)
                .reply_markup(start_keyboard())
                .await?;
        }
        Command::Buy => {
            let menu = state.flow.buy_menu();
            match render_menu(&menu) {
                Ok(markup) => {
                    bot.send_message(msg.chat.id, label(menu.text.unwrap_or(LabelKey::PricingInfo)))
                        .parse_mode(ParseMode::Html)
                        .reply_markup(markup)
                        .await?;
                }
                Err(e) => error!("Failed to render plan menu: {}", e),
            }
        }
    }
    Ok(())
}
