//! Tally bot - expense tracking over chat
//!
//! Multi-step conversations ("add an expense": which account, which category,
//! how much, ...) are declared as chains of steps and driven one inbound
//! message at a time.

mod chain;
mod commands;
mod completion;
mod config;
mod db;
mod report;
mod runtime;
mod telegram;

use chain::{ChainEvent, CommandRegistry};
use commands::CommandDeps;
use config::BotConfig;
use db::Database;
use runtime::{ConversationManager, Router};
use std::sync::Arc;
use telegram::TelegramClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let completion = completion::from_config(&config.completion)?;
    match &completion {
        Some(service) => tracing::info!(model = %service.model_id(), "Assistant configured"),
        None => tracing::warn!("No OPENROUTER_API_KEY configured, /insights is disabled"),
    }

    let mut registry = CommandRegistry::new();
    commands::register_all(&mut registry, &CommandDeps::new(db.clone(), completion))?;

    let client = Arc::new(match &config.telegram_api_url {
        Some(url) => TelegramClient::with_api_url(&config.token, url)?,
        None => TelegramClient::new(&config.token)?,
    });

    let username = match config.bot_username.clone() {
        Some(username) => Some(username),
        None => client.get_me().await?.username,
    };
    tracing::info!(username = ?username, "Connected to the Bot API");

    if let Err(e) = client
        .set_my_commands(&telegram::bot_commands(&registry))
        .await
    {
        tracing::warn!(error = %e, "Failed to publish the command menu");
    }

    let mut router = Router::new(registry, Arc::new(db));
    if let Some(username) = username {
        router = router.with_bot_username(username);
    }
    router.events().subscribe(log_chain_event);
    let router = Arc::new(router);

    let manager = ConversationManager::new(Arc::clone(&router), client.clone());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
        }
        shutdown.cancel();
    });

    telegram::poll(&client, &manager, cancel, config.poll_timeout_secs).await;

    if let Some(last) = router.events().value() {
        tracing::info!(conversation = %last.conversation(), "Last chain event before shutdown");
    }
    router.events().clear();
    Ok(())
}

fn log_chain_event(event: &ChainEvent) {
    match event {
        ChainEvent::Started { .. } | ChainEvent::Finished { .. } => {}
        ChainEvent::StepCompleted {
            conversation,
            command,
            step,
            kind,
        } => tracing::debug!(%conversation, command, step, kind, "Step completed"),
        ChainEvent::InvalidAnswer {
            conversation,
            command,
            step,
        } => tracing::info!(%conversation, command, step, "Invalid answer"),
    }
}
