//! Transport-agnostic menus. Labels are keys into the bot's label table; the chat
//! transport turns a [`Menu`] into an inline keyboard.

use subshop_db::models::InvoiceType;

use crate::token::CallbackToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKey {
    PricingInfo,
    Month(u32),
    StarsButton,
    DirectPaymentButton,
    CryptoButton,
    StripeButton,
    PayButton,
    BackButton,
}

impl LabelKey {
    pub fn for_channel(channel: InvoiceType) -> Self {
        match channel {
            InvoiceType::Telegram => LabelKey::StarsButton,
            InvoiceType::Stripe => LabelKey::StripeButton,
            InvoiceType::Crypto => LabelKey::CryptoButton,
        }
    }

    /// Translation key, e.g. `month_3` or `back_button`.
    pub fn key(&self) -> String {
        match self {
            LabelKey::PricingInfo => "pricing_info".to_string(),
            LabelKey::Month(months) => format!("month_{}", months),
            LabelKey::StarsButton => "stars_button".to_string(),
            LabelKey::DirectPaymentButton => "direct_payment_button".to_string(),
            LabelKey::CryptoButton => "crypto_button".to_string(),
            LabelKey::StripeButton => "stripe_button".to_string(),
            LabelKey::PayButton => "pay_button".to_string(),
            LabelKey::BackButton => "back_button".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    Callback(CallbackToken),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: LabelKey,
    pub target: ButtonTarget,
}

impl Button {
    pub fn callback(label: LabelKey, token: CallbackToken) -> Self {
        Self {
            label,
            target: ButtonTarget::Callback(token),
        }
    }

    pub fn url(label: LabelKey, url: impl Into<String>) -> Self {
        Self {
            label,
            target: ButtonTarget::Url(url.into()),
        }
    }

    pub fn token(&self) -> Option<&CallbackToken> {
        match &self.target {
            ButtonTarget::Callback(token) => Some(token),
            ButtonTarget::Url(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    /// Replaces the message text when set; otherwise only the keyboard changes.
    pub text: Option<LabelKey>,
    pub rows: Vec<Vec<Button>>,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: LabelKey) -> Self {
        self.text = Some(text);
        self
    }

    pub fn row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// The last button, which every payment menu reserves for "back".
    pub fn back(&self) -> Option<&Button> {
        self.buttons().last().filter(|b| b.label == LabelKey::BackButton)
    }

    pub fn callback_data(&self) -> Vec<String> {
        self.buttons().filter_map(Button::token).map(CallbackToken::encode).collect()
    }
}
