use reqwest::Url;
use subshop_core::menu::{ButtonTarget, LabelKey, Menu};
use subshop_core::{Action, CallbackToken};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub fn label(key: LabelKey) -> String {
    match key {
        LabelKey::PricingInfo => "💳 <b>Choose your plan</b>\n\nLonger plans are cheaper per month.".to_string(),
        LabelKey::Month(1) => "1 month".to_string(),
        LabelKey::Month(months) => format!("{} months", months),
        LabelKey::StarsButton => "⭐ Telegram Stars".to_string(),
        LabelKey::DirectPaymentButton => "💳 Other payment methods".to_string(),
        LabelKey::CryptoButton => "🪙 Crypto".to_string(),
        LabelKey::StripeButton => "💳 Card (Stripe)".to_string(),
        LabelKey::PayButton => "✅ Pay".to_string(),
        LabelKey::BackButton => "⬅️ Back".to_string(),
    }
}

pub fn render_menu(menu: &Menu) -> anyhow::Result<InlineKeyboardMarkup> {
    let mut grid = Vec::with_capacity(menu.rows.len());
    for row in &menu.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            let text = label(button.label);
            buttons.push(match &button.target {
                ButtonTarget::Callback(token) => InlineKeyboardButton::callback(text, token.encode()),
                ButtonTarget::Url(url) => InlineKeyboardButton::url(text, Url::parse(url)?),
            });
        }
        grid.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(grid))
}

pub fn start_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🛍 Buy Subscription",
        CallbackToken::new(Action::Buy).encode(),
    )]])
}
