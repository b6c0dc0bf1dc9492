//! The plan → method → invoice conversation. All state lives in the callback token;
//! every step is recomputed from the token, the configuration and storage.

use std::sync::Arc;
use subshop_db::models::InvoiceType;
use tracing::{debug, warn};

use crate::error::{PaymentError, Result};
use crate::menu::{Button, LabelKey, Menu};
use crate::orchestrator::{PaymentOrchestrator, SessionRequest};
use crate::policy::{Eligibility, MenuLayout, MenuPolicy};
use crate::token::{AMOUNT, Action, CallbackToken, INVOICE_TYPE, MONTH, Params, TokenError};

/// Who pressed the button. Request-scoped, passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackContext {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Render(Menu),
    /// A pay link was issued; the transport remembers which message shows it.
    Invoice { menu: Menu, purchase_id: i64 },
    /// Not a payment step; handled by another part of the bot.
    Delegated(Action),
}

#[derive(Clone)]
pub struct FlowController {
    policy: MenuPolicy,
    orchestrator: Arc<PaymentOrchestrator>,
}

fn malformed<T>(res: std::result::Result<T, TokenError>) -> Result<T> {
    res.map_err(|e| PaymentError::MalformedInput(e.to_string()))
}

fn plan_token(action: Action, months: u32, amount: i64) -> CallbackToken {
    CallbackToken::new(action).with(MONTH, months).with(AMOUNT, amount)
}

fn payment_token(months: u32, channel: InvoiceType, amount: i64) -> CallbackToken {
    CallbackToken::new(Action::Payment)
        .with(MONTH, months)
        .with(INVOICE_TYPE, channel)
        .with(AMOUNT, amount)
}

fn back(token: CallbackToken) -> Vec<Button> {
    vec![Button::callback(LabelKey::BackButton, token)]
}

impl FlowController {
    pub fn new(policy: MenuPolicy, orchestrator: Arc<PaymentOrchestrator>) -> Self {
        Self { policy, orchestrator }
    }

    pub async fn handle(&self, ctx: &CallbackContext, token: &CallbackToken) -> Result<FlowOutcome> {
        debug!(telegram_id = ctx.telegram_id, token = %token, "Handling callback");
        match token.action {
            Action::Buy => Ok(FlowOutcome::Render(self.buy_menu())),
            Action::Sell => self.sell_menu(ctx, &token.params).await.map(FlowOutcome::Render),
            Action::Direct => self.direct_menu(ctx, &token.params).await.map(FlowOutcome::Render),
            Action::Payment => self.payment(ctx, &token.params).await,
            Action::Start | Action::Connect | Action::Trial | Action::ActivateTrial | Action::Referral => {
                Ok(FlowOutcome::Delegated(token.action))
            }
        }
    }

    /// Plan tiers from the default price table. Four tiers render as a 2x2 grid.
    pub fn buy_menu(&self) -> Menu {
        let buttons: Vec<Button> = self
            .policy
            .config()
            .table_for(None)
            .tiers()
            .map(|(months, price)| Button::callback(LabelKey::Month(months), plan_token(Action::Sell, months, price)))
            .collect();

        let mut menu = Menu::new().with_text(LabelKey::PricingInfo);
        if buttons.len() == 4 {
            for pair in buttons.chunks(2) {
                menu = menu.row(pair.to_vec());
            }
        } else {
            menu = menu.row(buttons);
        }
        menu.row(back(CallbackToken::new(Action::Start)))
    }

    async fn sell_menu(&self, ctx: &CallbackContext, params: &Params) -> Result<Menu> {
        let months = malformed(params.require_u32(MONTH))?;
        let amount = malformed(params.require_i64(AMOUNT))?;
        let eligibility = self.policy.eligibility(ctx.telegram_id).await;

        let mut menu = Menu::new();
        match eligibility.layout() {
            MenuLayout::TwoStep => {
                menu = menu
                    .row(vec![Button::callback(
                        LabelKey::StarsButton,
                        payment_token(months, InvoiceType::Telegram, amount),
                    )])
                    .row(vec![Button::callback(
                        LabelKey::DirectPaymentButton,
                        plan_token(Action::Direct, months, amount),
                    )]);
            }
            MenuLayout::Flat => {
                for channel in eligibility.method_buttons() {
                    menu = menu.row(vec![Button::callback(
                        LabelKey::for_channel(channel),
                        payment_token(months, channel, amount),
                    )]);
                }
            }
        }
        Ok(menu.row(back(CallbackToken::new(Action::Buy))))
    }

    async fn direct_menu(&self, ctx: &CallbackContext, params: &Params) -> Result<Menu> {
        let months = malformed(params.require_u32(MONTH))?;
        let amount = malformed(params.require_i64(AMOUNT))?;
        let eligibility = self.policy.eligibility(ctx.telegram_id).await;

        let mut menu = Menu::new();
        for channel in eligibility.direct_buttons() {
            menu = menu.row(vec![Button::callback(
                LabelKey::for_channel(channel),
                payment_token(months, channel, amount),
            )]);
        }
        Ok(menu.row(back(plan_token(Action::Sell, months, amount))))
    }

    async fn payment(&self, ctx: &CallbackContext, params: &Params) -> Result<FlowOutcome> {
        let months = malformed(params.require_u32(MONTH))?;
        let requested = params.get(INVOICE_TYPE).and_then(|s| s.parse::<InvoiceType>().ok());
        let eligibility = self.policy.eligibility(ctx.telegram_id).await;

        let request = self.session_request(ctx, months, requested, &eligibility)?;
        let session = self.orchestrator.create_session(&request).await?;

        let back_action = if eligibility.layout() == MenuLayout::TwoStep && session.channel != InvoiceType::Telegram {
            Action::Direct
        } else {
            Action::Sell
        };

        let menu = Menu::new().row(vec![
            Button::url(LabelKey::PayButton, session.pay_url),
            Button::callback(LabelKey::BackButton, plan_token(back_action, months, session.amount)),
        ]);
        Ok(FlowOutcome::Invoice {
            menu,
            purchase_id: session.purchase_id,
        })
    }

    fn session_request(
        &self,
        ctx: &CallbackContext,
        months: u32,
        requested: Option<InvoiceType>,
        eligibility: &Eligibility,
    ) -> Result<SessionRequest> {
        match requested {
            Some(channel) if eligibility.allows(channel) => {
                Ok(SessionRequest::new(ctx.telegram_id, ctx.username.clone(), months, channel))
            }
            Some(channel) => {
                warn!(telegram_id = ctx.telegram_id, %channel, "Payment requested through an ineligible channel");
                Err(PaymentError::ChannelUnavailable(channel.to_string()))
            }
            None => {
                let channel = eligibility
                    .first_direct()
                    .ok_or_else(|| PaymentError::ChannelUnavailable("direct".to_string()))?;
                debug!(telegram_id = ctx.telegram_id, %channel, "No usable invoice type, using default pricing");
                Ok(SessionRequest::new(ctx.telegram_id, ctx.username.clone(), months, channel).priced_from_default_table())
            }
        }
    }
}
