use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bot;
mod config;
mod notifier;
mod state;
mod webhook;

use crate::config::BotConfig;
use crate::state::AppState;
use subshop_db::repositories::{CustomerRepository, PurchaseRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "subshop=debug,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BotConfig::load()?;
    config.validate()?;
    tracing::info!("Subshop bot starting...");
    tracing::debug!("Config: {:?}", config);

    let pool = subshop_db::connect(&config.database_url, config.db_acquire_timeout()).await?;
    let customers = Arc::new(CustomerRepository::new(pool.clone()));
    let purchases = Arc::new(PurchaseRepository::new(pool));

    let bot = Bot::new(config.bot_token.clone());
    let state = AppState::build(&config, bot.clone(), customers, purchases)?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Webhook server listening on {}", addr);

    let app = webhook::router(state.webhooks.clone());
    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = ctrl_c_tx.send(());
        }
    });

    bot::run_bot(bot, shutdown_tx.subscribe(), state).await;

    let _ = shutdown_tx.send(());
    server.await??;
    tracing::info!("Subshop bot stopped");
    Ok(())
}
