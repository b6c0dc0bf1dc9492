use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::time::Duration;
use subshop_core::processor::{CryptoPaySettings, StripeSettings};
use subshop_core::{PaymentConfig, PriceTable};

const CONFIG_PATHS: [&str; 2] = ["/etc/subshop/bot.toml", "./bot.toml"];

#[derive(Clone, Deserialize)]
pub struct BotConfig {
    pub bot_token: String,
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_db_acquire_timeout")]
    pub db_acquire_timeout_secs: u64,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub stripe: StripeSettings,
    #[serde(default)]
    pub crypto_pay: CryptoPaySettings,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_acquire_timeout() -> u64 {
    5
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &"<redacted>")
            .field("database_url", &"<redacted>")
            .field("listen_addr", &self.listen_addr)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("payment", &self.payment)
            .field("stripe", &self.stripe)
            .field("crypto_pay", &self.crypto_pay)
            .finish()
    }
}

impl BotConfig {
    pub fn load() -> Result<Self> {
        for path in CONFIG_PATHS {
            if let Ok(contents) = fs::read_to_string(path) {
                tracing::info!("Loading config from {}", path);
                return toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path));
            }
        }

        tracing::info!("Loading config from environment");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| {
            get(key)
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };
        let number = |key: &str| -> Result<Option<i64>> {
            get(key)
                .map(|v| v.trim().parse::<i64>().with_context(|| format!("{} must be an integer", key)))
                .transpose()
        };
        let table = |prefix: &str| -> Result<Option<PriceTable>> {
            let m1 = number(&format!("{}_1", prefix))?;
            let m3 = number(&format!("{}_3", prefix))?;
            let m6 = number(&format!("{}_6", prefix))?;
            let m12 = number(&format!("{}_12", prefix))?;
            if m1.is_none() && m3.is_none() && m6.is_none() && m12.is_none() {
                return Ok(None);
            }
            Ok(Some(PriceTable {
                month_1: m1.unwrap_or(0),
                month_3: m3.unwrap_or(0),
                month_6: m6.unwrap_or(0),
                month_12: m12.unwrap_or(0),
            }))
        };

        let defaults = PaymentConfig::default();
        let payment = PaymentConfig {
            stars_enabled: flag("TELEGRAM_STARS_ENABLED"),
            stripe_enabled: flag("STRIPE_ENABLED"),
            crypto_enabled: flag("CRYPTO_PAY_ENABLED"),
            require_paid_purchase_for_stars: flag("REQUIRE_PAID_PURCHASE_FOR_STARS"),
            prices: table("PRICE")?.unwrap_or_default(),
            stripe_prices: table("STRIPE_PRICE")?,
            stars_prices: table("STARS_PRICE")?.unwrap_or_default(),
            currency: get("CURRENCY").unwrap_or(defaults.currency),
            external_timeout_secs: number("EXTERNAL_TIMEOUT_SECS")?
                .map(|v| v.max(1) as u64)
                .unwrap_or(defaults.external_timeout_secs),
        };

        Ok(Self {
            bot_token: get("BOT_TOKEN").context("BOT_TOKEN is not set")?,
            database_url: get("DATABASE_URL").context("DATABASE_URL is not set")?,
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(default_listen_addr),
            db_acquire_timeout_secs: number("DB_ACQUIRE_TIMEOUT_SECS")?
                .map(|v| v.max(1) as u64)
                .unwrap_or_else(default_db_acquire_timeout),
            payment,
            stripe: StripeSettings {
                secret_key: get("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: get("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                success_url: get("STRIPE_SUCCESS_URL").unwrap_or_default(),
                cancel_url: get("STRIPE_CANCEL_URL").unwrap_or_default(),
            },
            crypto_pay: CryptoPaySettings {
                api_token: get("CRYPTO_PAY_TOKEN").unwrap_or_default(),
                testnet: flag("CRYPTO_PAY_TESTNET"),
            },
        })
    }

    /// Refuses to start with a channel enabled but not configured.
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            bail!("bot_token is empty");
        }
        if self.payment.stripe_enabled {
            if self.stripe.secret_key.is_empty() || self.stripe.webhook_secret.is_empty() {
                bail!("Stripe is enabled but its secret key or webhook secret is missing");
            }
            if self.stripe.success_url.is_empty() || self.stripe.cancel_url.is_empty() {
                bail!("Stripe is enabled but success_url/cancel_url are missing");
            }
        }
        if self.payment.crypto_enabled && self.crypto_pay.api_token.is_empty() {
            bail!("Crypto Pay is enabled but its API token is missing");
        }
        Ok(())
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }
}
